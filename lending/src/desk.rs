//! The lending desk: request/response API over the lifecycle store.
//!
//! Every command is sent to the [`Store`] and its outcome is read back while
//! the write lock is still held, so a caller always sees the result of its
//! own command. The desk then waits for the command's persistence effect
//! before replying.
//!
//! ```ignore
//! let desk = LendingDesk::open(environment).await?;
//! let rental = desk.rent(book_id, member_id).await?;
//! desk.return_book(rental.id).await?;
//! ```

use crate::engine::{
    LendingAction, LendingEnvironment, LendingReducer, LendingState, PersistenceFailure,
    SweepReport,
};
use crate::error::{Entity, ErrorKind, LendingError};
use crate::inventory::Book;
use crate::rental::Rental;
use crate::repository::RepositoryError;
use crate::standing::Member;
use crate::types::{BookId, Credential, MemberId, RentalId, Role};
use bookrental_core::environment::Clock;
use bookrental_runtime::{Store, StoreError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// The store the desk drives
pub type LendingStore = Store<LendingState, LendingAction, LendingEnvironment, LendingReducer>;

/// A desk request failed
#[derive(Error, Debug)]
pub enum DeskError {
    /// The command broke a lending rule; nothing changed
    #[error(transparent)]
    Lending(#[from] LendingError),

    /// The store refused the command
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),

    /// Storage could not be read
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// The command was applied in memory but storage refused it
    #[error("change applied but not stored: {0}")]
    Persistence(String),

    /// The command succeeded but its result could not be read back
    #[error("command succeeded without producing a {0}")]
    MissingResult(Entity),
}

impl DeskError {
    /// The lending rule that was broken, if that is what happened
    #[must_use]
    pub const fn lending(&self) -> Option<&LendingError> {
        match self {
            Self::Lending(error) => Some(error),
            _ => None,
        }
    }

    /// Classification of the broken lending rule
    #[must_use]
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self.lending() {
            Some(error) => Some(error.kind()),
            None => None,
        }
    }
}

/// Request/response facade over the lending store
#[derive(Clone)]
pub struct LendingDesk {
    store: LendingStore,
    clock: Arc<dyn Clock>,
}

impl LendingDesk {
    /// A desk over `state`
    #[must_use]
    pub fn new(state: LendingState, environment: LendingEnvironment) -> Self {
        let clock = Arc::clone(&environment.clock);
        Self {
            store: Store::new(state, LendingReducer::new(), environment),
            clock,
        }
    }

    /// A desk over everything the environment's repositories hold
    ///
    /// # Errors
    ///
    /// [`DeskError::Repository`] if storage cannot be read.
    pub async fn open(environment: LendingEnvironment) -> Result<Self, DeskError> {
        let snapshot = environment.repositories.load().await?;
        tracing::info!(
            books = snapshot.books.len(),
            members = snapshot.members.len(),
            rentals = snapshot.rentals.len(),
            "Lending desk hydrated from storage"
        );
        let mut state = LendingState::restore(snapshot.books, snapshot.members, snapshot.rentals);
        state.revision = snapshot.revision;
        Ok(Self::new(state, environment))
    }

    /// The underlying store
    #[must_use]
    pub const fn store(&self) -> &LendingStore {
        &self.store
    }

    /// Send a command, read its result, and wait until it is stored
    async fn execute<T, F>(
        &self,
        action: LendingAction,
        entity: Entity,
        read: F,
    ) -> Result<T, DeskError>
    where
        F: FnOnce(&LendingState) -> Option<T>,
    {
        let (outcome, mut handle) = self
            .store
            .send_and_inspect(action, |state| {
                state
                    .last_outcome()
                    .map(|()| (read(state), state.revision))
            })
            .await?;
        let (result, revision) = outcome?;

        handle.wait().await;
        let failure = self
            .store
            .state(|state| state.last_persistence_error.clone())
            .await;
        if let Some(PersistenceFailure { error, .. }) =
            failure.filter(|failure| failure.revision == revision)
        {
            return Err(DeskError::Persistence(error));
        }

        result.ok_or(DeskError::MissingResult(entity))
    }

    // ========== Inventory ==========

    /// Catalogue a new title with every copy on the shelf
    ///
    /// # Errors
    ///
    /// `Validation` for blank fields or negative copies, `Conflict` for a
    /// taken ISBN.
    #[tracing::instrument(skip(self, title, author))]
    pub async fn register_book(
        &self,
        isbn: &str,
        title: &str,
        author: &str,
        total_copies: i64,
    ) -> Result<Book, DeskError> {
        let action = LendingAction::RegisterBook {
            isbn: isbn.to_string(),
            title: title.to_string(),
            author: author.to_string(),
            total_copies,
        };
        self.execute(action, Entity::Book, |state| {
            state.last_book.and_then(|id| state.inventory.get(id)).cloned()
        })
        .await
    }

    /// Add copies of a title
    ///
    /// # Errors
    ///
    /// `NotFound` or `Validation`.
    pub async fn add_copies(&self, book_id: BookId, quantity: i64) -> Result<Book, DeskError> {
        self.execute(
            LendingAction::AddCopies { book_id, quantity },
            Entity::Book,
            |state| state.inventory.get(book_id).cloned(),
        )
        .await
    }

    /// Write off shelved copies of a title
    ///
    /// # Errors
    ///
    /// `NotFound`, `Validation`, or `OutOfStock` when fewer copies are on
    /// the shelf.
    pub async fn remove_copies(&self, book_id: BookId, quantity: i64) -> Result<Book, DeskError> {
        self.execute(
            LendingAction::RemoveCopies { book_id, quantity },
            Entity::Book,
            |state| state.inventory.get(book_id).cloned(),
        )
        .await
    }

    /// One title
    ///
    /// # Errors
    ///
    /// `NotFound`.
    pub async fn book(&self, book_id: BookId) -> Result<Book, DeskError> {
        self.store
            .state(|state| state.inventory.book(book_id).cloned())
            .await
            .map_err(DeskError::from)
    }

    /// Every title, in registration order
    pub async fn list_books(&self) -> Vec<Book> {
        self.store
            .state(|state| state.inventory.iter().cloned().collect())
            .await
    }

    /// Titles whose title, author or ISBN contains `keyword`, ignoring case
    pub async fn search_books(&self, keyword: &str) -> Vec<Book> {
        self.store
            .state(|state| state.inventory.search(keyword).into_iter().cloned().collect())
            .await
    }

    // ========== Members ==========

    /// Sign up a member
    ///
    /// # Errors
    ///
    /// `Validation` for blank fields or a malformed email, `Conflict` for a
    /// taken email.
    #[tracing::instrument(skip(self, name, credential))]
    pub async fn register_member(
        &self,
        name: &str,
        email: &str,
        credential: Credential,
        role: Role,
    ) -> Result<Member, DeskError> {
        let action = LendingAction::RegisterMember {
            name: name.to_string(),
            email: email.to_string(),
            credential,
            role,
        };
        self.execute(action, Entity::Member, |state| {
            state.last_member.and_then(|id| state.roster.get(id)).cloned()
        })
        .await
    }

    /// One member
    ///
    /// # Errors
    ///
    /// `NotFound`.
    pub async fn member(&self, member_id: MemberId) -> Result<Member, DeskError> {
        self.store
            .state(|state| state.roster.member(member_id).cloned())
            .await
            .map_err(DeskError::from)
    }

    /// Whether the member is suspended today
    ///
    /// # Errors
    ///
    /// `NotFound`.
    pub async fn is_suspended(&self, member_id: MemberId) -> Result<bool, DeskError> {
        let today = self.clock.today();
        self.store
            .state(|state| {
                state
                    .roster
                    .member(member_id)
                    .map(|member| member.is_suspended(today))
            })
            .await
            .map_err(DeskError::from)
    }

    // ========== Rentals ==========

    /// Lend one copy of `book_id` to `member_id`
    ///
    /// # Errors
    ///
    /// `NotFound`, `Suspended`, `OverdueBlock`, `BorrowLimit` or `OutOfStock`.
    #[tracing::instrument(skip(self))]
    pub async fn rent(&self, book_id: BookId, member_id: MemberId) -> Result<Rental, DeskError> {
        self.execute(
            LendingAction::Rent { book_id, member_id },
            Entity::Rental,
            |state| state.last_rental.and_then(|id| state.rentals.get(id)).cloned(),
        )
        .await
    }

    /// Take a book back, charging any overdue days as suspension
    ///
    /// # Errors
    ///
    /// `NotFound` or `AlreadyReturned`.
    #[tracing::instrument(skip(self))]
    pub async fn return_book(&self, rental_id: RentalId) -> Result<Rental, DeskError> {
        self.execute(LendingAction::Return { rental_id }, Entity::Rental, |state| {
            state.rentals.get(rental_id).cloned()
        })
        .await
    }

    /// Push a rental's due date back by the policy's extension period
    ///
    /// # Errors
    ///
    /// `NotFound`, `OverdueBlock`, `Suspended`, `AlreadyReturned` or
    /// `ExtensionLimit`.
    #[tracing::instrument(skip(self))]
    pub async fn extend_rental(&self, rental_id: RentalId) -> Result<Rental, DeskError> {
        self.execute(LendingAction::Extend { rental_id }, Entity::Rental, |state| {
            state.rentals.get(rental_id).cloned()
        })
        .await
    }

    /// Charge one member for every overdue rental they hold
    ///
    /// # Errors
    ///
    /// `NotFound`.
    #[tracing::instrument(skip(self))]
    pub async fn check_overdue_and_apply_suspension(
        &self,
        member_id: MemberId,
    ) -> Result<SweepReport, DeskError> {
        self.execute(
            LendingAction::CheckOverdue { member_id },
            Entity::Member,
            |state| state.last_sweep,
        )
        .await
    }

    /// Charge every member for every overdue rental
    ///
    /// # Errors
    ///
    /// Only infrastructure errors; the sweep itself cannot be rejected.
    pub async fn sweep_overdue(&self) -> Result<SweepReport, DeskError> {
        self.execute(LendingAction::SweepOverdue, Entity::Member, |state| {
            state.last_sweep
        })
        .await
    }

    /// One rental
    ///
    /// # Errors
    ///
    /// `NotFound`.
    pub async fn rental(&self, rental_id: RentalId) -> Result<Rental, DeskError> {
        self.store
            .state(|state| state.rentals.rental(rental_id).cloned())
            .await
            .map_err(DeskError::from)
    }

    /// A member's rentals, open and closed, most recently rented first
    ///
    /// # Errors
    ///
    /// `NotFound` if the member does not exist.
    pub async fn rentals_by_member(&self, member_id: MemberId) -> Result<Vec<Rental>, DeskError> {
        self.store
            .state(|state| {
                state.roster.member(member_id)?;
                let mut rentals: Vec<Rental> = state.rentals.by_member(member_id).cloned().collect();
                rentals.reverse();
                rentals.sort_by(|a, b| b.rented_at.cmp(&a.rented_at));
                Ok::<_, LendingError>(rentals)
            })
            .await
            .map_err(DeskError::from)
    }

    /// Most recent storage failure, if any
    pub async fn last_persistence_error(&self) -> Option<PersistenceFailure> {
        self.store
            .state(|state| state.last_persistence_error.clone())
            .await
    }

    /// Stop accepting commands and wait for pending writes
    ///
    /// # Errors
    ///
    /// [`DeskError::Store`] if writes are still pending after `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), DeskError> {
        self.store.shutdown(timeout).await.map_err(DeskError::from)
    }
}

impl std::fmt::Debug for LendingDesk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LendingDesk").finish_non_exhaustive()
    }
}
