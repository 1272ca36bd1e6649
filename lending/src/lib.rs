//! # Book Rental
//!
//! A lending library built on the reducer architecture: members borrow and
//! return books under inventory and policy constraints.
//!
//! - [`inventory`]: total versus available copies per title
//! - [`rental`]: one borrow transaction, `Rented` to `Returned`
//! - [`standing`]: members and their stacking suspensions
//! - [`engine`]: the lifecycle reducer tying the three together
//! - [`desk`]: request/response API for callers
//! - [`sweeper`]: periodic overdue charging
//!
//! ## Example
//!
//! ```ignore
//! use bookrental::{LendingDesk, LendingEnvironment, LendingPolicy, Repositories};
//!
//! let env = LendingEnvironment::new(
//!     Arc::new(SystemClock),
//!     Arc::new(RandomIds),
//!     Repositories::in_memory(),
//!     LendingPolicy::default(),
//! );
//! let desk = LendingDesk::open(env).await?;
//! let book = desk.register_book("978-0441013593", "Dune", "Frank Herbert", 2).await?;
//! ```

pub mod config;
pub mod desk;
pub mod engine;
pub mod error;
pub mod inventory;
pub mod policy;
pub mod rental;
pub mod repository;
pub mod standing;
pub mod sweeper;
pub mod types;

pub use config::{Config, ConfigError};
pub use desk::{DeskError, LendingDesk, LendingStore};
pub use engine::{LendingAction, LendingEnvironment, LendingReducer, LendingState, SweepReport};
pub use error::{ErrorKind, LendingError};
pub use inventory::{Book, Inventory};
pub use policy::LendingPolicy;
pub use rental::{Rental, RentalStatus};
pub use repository::{
    BookRepository, MemberRepository, RentalRepository, Repositories, RepositoryError,
};
pub use standing::Member;
pub use sweeper::OverdueSweeper;
pub use types::{BookId, Credential, MemberId, RentalId, Role};
