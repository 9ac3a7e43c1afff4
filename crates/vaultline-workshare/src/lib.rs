//! Bounded fork/join worker pool for recursive algorithms
//!
//! A recursive routine asks its [`AsyncGroup`] at every step whether a unit
//! of work may be offloaded. While the pool has a free slot the work goes to
//! a worker; otherwise it is recursed into inline. Total parallelism never
//! exceeds the pool capacity, whatever the depth or branching factor.
//!
//! # Example
//!
//! ```rust
//! use vaultline_workshare::{AsyncGroup, Pool, PoolHandle};
//!
//! fn sum(pool: &PoolHandle, values: &[u64]) -> u64 {
//!     if values.len() <= 2 {
//!         return values.iter().sum();
//!     }
//!
//!     let (left, right) = values.split_at(values.len() / 2);
//!     let mut group = AsyncGroup::new();
//!     let mut total = 0;
//!
//!     for half in [left.to_vec(), right.to_vec()] {
//!         if group.can_share_work(pool) {
//!             group.run_async(
//!                 pool,
//!                 |pool, req: &mut (Vec<u64>, u64)| req.1 = sum(pool, &req.0),
//!                 (half, 0),
//!             );
//!         } else {
//!             total += sum(pool, &half);
//!         }
//!     }
//!
//!     total + group.wait().iter().map(|req| req.1).sum::<u64>()
//! }
//!
//! let pool = Pool::new(4).unwrap();
//! assert_eq!(sum(&pool, &(1..=100).collect::<Vec<_>>()), 5050);
//! pool.close();
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod group;
pub mod pool;

pub use error::PoolError;
pub use group::AsyncGroup;
pub use pool::{Pool, PoolHandle};
