//! Consolidated test modules.
//!
//! This module contains end-to-end decommission runs against the in-memory
//! Glacier fake.
