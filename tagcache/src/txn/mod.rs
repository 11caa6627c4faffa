// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transaction management
//!
//! Cache writes made inside a database transaction must not be observable as
//! valid by sessions overlapping that transaction. This module provides the
//! per-thread transaction/savepoint stack, the isolation levels, and the
//! per-level lock strategies applied to cache dependencies.

pub mod isolation;
pub mod locks;
pub mod manager;
pub mod transaction;

pub use isolation::IsolationLevel;
pub use locks::DependencyLock;
pub use manager::{ThreadBoundTransactionManager, TransactionManager};
pub use transaction::{Transaction, TransactionView};
