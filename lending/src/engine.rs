//! Rental lifecycle engine.
//!
//! [`LendingReducer`] turns commands into events against [`LendingState`]:
//!
//! 1. The command is validated and decided in full against current state.
//!    Entities are never touched during this step; every decision returns
//!    updated *copies* (see [`Inventory`], [`Roster`], [`RentalLedger`]).
//! 2. If any rule fails, a single [`LendingAction::CommandRejected`] is
//!    applied, which only records the error. State is otherwise untouched.
//! 3. Otherwise the produced events are applied in order and one
//!    [`Effect::Future`] persists the snapshots they carry.
//!
//! Events can also be sent directly, which replays them without
//! re-validating or persisting.
//!
//! ## Penalties
//!
//! Overdue days are charged as suspension days, both when an overdue book
//! comes back and when a sweep inspects a member. Each rental records the
//! days already charged ([`Rental::penalty_days`]), so every path charges only
//! the difference and no day is charged twice, even across a restart. A
//! charge also leaves the member suspended until at least today plus the
//! rental's overdue days, however much of it earlier sweeps already charged.

use crate::error::LendingError;
use crate::inventory::{Book, Inventory};
use crate::policy::LendingPolicy;
use crate::rental::{Rental, RentalLedger};
use crate::repository::{ChangeSet, Repositories};
use crate::standing::{Member, Roster};
use crate::types::{BookId, Credential, MemberId, RentalId, Role, days_after};
use bookrental_core::environment::{Clock, IdGenerator};
use bookrental_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Outcome of an overdue check
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Members inspected
    pub members_checked: usize,
    /// Members whose suspension grew
    pub members_suspended: usize,
    /// Overdue rentals that produced a charge
    pub rentals_charged: usize,
    /// Suspension days added in total
    pub days_charged: u64,
}

/// A committed change that storage refused
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceFailure {
    /// Revision of the change set
    pub revision: u64,
    /// What storage reported
    pub error: String,
}

/// Everything the engine knows
#[derive(Clone, Debug, Default)]
pub struct LendingState {
    /// Catalogue
    pub inventory: Inventory,
    /// Members
    pub roster: Roster,
    /// Rentals, open and closed
    pub rentals: RentalLedger,
    /// Bumped once per committed command
    pub revision: u64,
    /// Error of the most recent command, if it was rejected
    pub last_error: Option<LendingError>,
    /// Book created or changed by the most recent command
    pub last_book: Option<BookId>,
    /// Member created or changed by the most recent command
    pub last_member: Option<MemberId>,
    /// Rental created or changed by the most recent command
    pub last_rental: Option<RentalId>,
    /// Report of the most recent overdue check
    pub last_sweep: Option<SweepReport>,
    /// Most recent storage failure
    pub last_persistence_error: Option<PersistenceFailure>,
}

impl LendingState {
    /// State rebuilt from stored entities
    ///
    /// Charged overdue days are part of each stored rental.
    #[must_use]
    pub fn restore(books: Vec<Book>, members: Vec<Member>, rentals: Vec<Rental>) -> Self {
        let mut state = Self::default();
        for book in books {
            state.inventory.commit(book);
        }
        for member in members {
            state.roster.commit(member);
        }
        for rental in rentals {
            state.rentals.commit(rental);
        }
        state
    }

    /// `Err` with the most recent command's error, if it was rejected
    ///
    /// # Errors
    ///
    /// The recorded [`LendingError`].
    pub fn last_outcome(&self) -> Result<(), LendingError> {
        self.last_error.clone().map_or(Ok(()), Err)
    }

    fn begin_command(&mut self) {
        self.last_error = None;
        self.last_book = None;
        self.last_member = None;
        self.last_rental = None;
        self.last_sweep = None;
    }
}

/// Commands accepted by the engine and the events they produce
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LendingAction {
    // Commands
    /// Catalogue a new title
    RegisterBook {
        /// ISBN
        isbn: String,
        /// Title
        title: String,
        /// Author
        author: String,
        /// Copies owned, must not be negative
        total_copies: i64,
    },
    /// Add copies of a title
    AddCopies {
        /// Title to restock
        book_id: BookId,
        /// Copies to add, at least one
        quantity: i64,
    },
    /// Write off shelved copies of a title
    RemoveCopies {
        /// Title to shrink
        book_id: BookId,
        /// Copies to remove, at least one
        quantity: i64,
    },
    /// Sign up a member
    RegisterMember {
        /// Display name
        name: String,
        /// Email
        email: String,
        /// Hashed password
        credential: Credential,
        /// Role
        role: Role,
    },
    /// Lend a copy of a title to a member
    Rent {
        /// Title
        book_id: BookId,
        /// Borrower
        member_id: MemberId,
    },
    /// Take a book back
    Return {
        /// Rental to close
        rental_id: RentalId,
    },
    /// Push a rental's due date back
    Extend {
        /// Rental to extend
        rental_id: RentalId,
    },
    /// Charge one member for their overdue rentals
    CheckOverdue {
        /// Member to inspect
        member_id: MemberId,
    },
    /// Charge every member for their overdue rentals
    SweepOverdue,

    // Events
    /// A title was catalogued
    BookRegistered {
        /// The new title
        book: Book,
    },
    /// A title's copy counts changed outside a rental
    StockAdjusted {
        /// The title after the change
        book: Book,
    },
    /// A member signed up
    MemberRegistered {
        /// The new member
        member: Member,
    },
    /// A copy was lent
    BookRented {
        /// The new rental
        rental: Rental,
        /// The title with one copy fewer on the shelf
        book: Book,
    },
    /// A copy came back
    BookReturned {
        /// The closed rental
        rental: Rental,
        /// The title with the copy back on the shelf
        book: Book,
    },
    /// A due date moved
    RentalExtended {
        /// The rental after the extension
        rental: Rental,
    },
    /// Overdue days were charged to a member
    MemberSuspended {
        /// The member after the charge
        member: Member,
        /// The overdue rental, with the charge recorded
        rental: Rental,
        /// Days charged
        days: u32,
    },
    /// An overdue check finished
    OverdueChecked {
        /// What it did
        report: SweepReport,
    },
    /// A command broke a rule
    CommandRejected {
        /// The rule it broke
        error: LendingError,
    },
    /// Storing a committed change failed
    PersistenceFailed {
        /// Revision of the change set
        revision: u64,
        /// What storage reported
        error: String,
    },
}

impl LendingAction {
    /// Whether this is a caller request rather than a fact
    #[must_use]
    pub const fn is_command(&self) -> bool {
        matches!(
            self,
            Self::RegisterBook { .. }
                | Self::AddCopies { .. }
                | Self::RemoveCopies { .. }
                | Self::RegisterMember { .. }
                | Self::Rent { .. }
                | Self::Return { .. }
                | Self::Extend { .. }
                | Self::CheckOverdue { .. }
                | Self::SweepOverdue
        )
    }

    /// Whether this is a fact produced by the engine
    #[must_use]
    pub const fn is_event(&self) -> bool {
        !self.is_command()
    }
}

/// Dependencies of the lending engine
#[derive(Clone)]
pub struct LendingEnvironment {
    /// Source of "today"
    pub clock: Arc<dyn Clock>,
    /// Source of new ids
    pub ids: Arc<dyn IdGenerator>,
    /// Where committed changes are written
    pub repositories: Repositories,
    /// Limits and periods
    pub policy: LendingPolicy,
}

impl LendingEnvironment {
    /// Creates a new `LendingEnvironment`
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        repositories: Repositories,
        policy: LendingPolicy,
    ) -> Self {
        Self {
            clock,
            ids,
            repositories,
            policy,
        }
    }
}

impl std::fmt::Debug for LendingEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LendingEnvironment")
            .field("today", &self.clock.today())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

type Decision = Result<Vec<LendingAction>, LendingError>;

/// Reducer for the rental lifecycle
#[derive(Clone, Debug, Default)]
pub struct LendingReducer;

impl LendingReducer {
    /// Creates a new `LendingReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn decide_register_book(
        state: &LendingState,
        env: &LendingEnvironment,
        isbn: &str,
        title: &str,
        author: &str,
        total_copies: i64,
    ) -> Decision {
        let id = BookId::from_uuid(env.ids.next_id());
        let book = state
            .inventory
            .register(id, isbn, title, author, total_copies)?;
        Ok(vec![LendingAction::BookRegistered { book }])
    }

    fn decide_register_member(
        state: &LendingState,
        env: &LendingEnvironment,
        name: &str,
        email: &str,
        credential: Credential,
        role: Role,
    ) -> Decision {
        let id = MemberId::from_uuid(env.ids.next_id());
        let member = state.roster.sign_up(id, name, email, credential, role)?;
        Ok(vec![LendingAction::MemberRegistered { member }])
    }

    /// Suspended, then overdue, then borrow limit, then stock
    fn decide_rent(
        state: &LendingState,
        env: &LendingEnvironment,
        book_id: BookId,
        member_id: MemberId,
    ) -> Decision {
        let today = env.clock.today();
        let member = state.roster.member(member_id)?;

        if let Some(until) = member.suspend_until.filter(|_| member.is_suspended(today)) {
            return Err(LendingError::Suspended { until });
        }

        let overdue = state.rentals.overdue_for(member_id, today).count();
        if overdue > 0 {
            return Err(LendingError::OverdueBlock { overdue });
        }

        let limit = env.policy.user_borrow_limit;
        if member.is_limited() {
            let active = state.rentals.active_for(member_id).count();
            if active >= usize::try_from(limit).unwrap_or(usize::MAX) {
                return Err(LendingError::BorrowLimit { limit });
            }
        }

        let book = state.inventory.decrement_available(book_id)?;
        let rental = Rental::open(
            RentalId::from_uuid(env.ids.next_id()),
            book_id,
            member_id,
            today,
            env.policy.loan_period_days,
        );
        Ok(vec![LendingAction::BookRented { rental, book }])
    }

    /// The overdue charge is computed on the rental before it is closed
    fn decide_return(
        state: &LendingState,
        env: &LendingEnvironment,
        rental_id: RentalId,
    ) -> Decision {
        let today = env.clock.today();
        let rental = state.rentals.rental(rental_id)?;
        let mut returned = rental.mark_returned(today)?;
        let book = state.inventory.increment_available(rental.book_id)?;

        let mut events = Vec::with_capacity(2);
        if rental.is_overdue(today) {
            match state.roster.get(rental.member_id) {
                Some(member) => {
                    let mut member = member.clone();
                    if let Some(days) = Self::charge(&mut member, rental, today, &mut events) {
                        returned = returned.charged(days);
                    }
                },
                None => tracing::warn!(
                    rental_id = %rental_id,
                    member_id = %rental.member_id,
                    "Overdue rental belongs to an unknown member; no penalty charged"
                ),
            }
        }
        events.push(LendingAction::BookReturned {
            rental: returned,
            book,
        });
        Ok(events)
    }

    /// Overdue (any rental), then suspended, then closed, then the cap
    fn decide_extend(
        state: &LendingState,
        env: &LendingEnvironment,
        rental_id: RentalId,
    ) -> Decision {
        let today = env.clock.today();
        let rental = state.rentals.rental(rental_id)?;

        let overdue = state.rentals.overdue_for(rental.member_id, today).count();
        if overdue > 0 {
            return Err(LendingError::OverdueBlock { overdue });
        }

        let member = state.roster.member(rental.member_id)?;
        if let Some(until) = member.suspend_until.filter(|_| member.is_suspended(today)) {
            return Err(LendingError::Suspended { until });
        }

        if !rental.is_active() {
            return Err(LendingError::AlreadyReturned { rental_id });
        }
        if let Some(max) = env.policy.max_extensions {
            if rental.extension_count >= max {
                return Err(LendingError::ExtensionLimit { rental_id, max });
            }
        }

        let extended = rental.extend(env.policy.extension_days)?;
        Ok(vec![LendingAction::RentalExtended { rental: extended }])
    }

    fn decide_check_overdue(
        state: &LendingState,
        env: &LendingEnvironment,
        member_id: MemberId,
    ) -> Decision {
        let member = state.roster.member(member_id)?;
        let mut events = Vec::new();
        let mut report = SweepReport::default();
        Self::sweep_member(state, member, env.clock.today(), &mut events, &mut report);
        events.push(LendingAction::OverdueChecked { report });
        Ok(events)
    }

    fn decide_sweep(state: &LendingState, env: &LendingEnvironment) -> Decision {
        let today = env.clock.today();
        let mut events = Vec::new();
        let mut report = SweepReport::default();
        for member in state.roster.iter() {
            Self::sweep_member(state, member, today, &mut events, &mut report);
        }
        events.push(LendingAction::OverdueChecked { report });
        Ok(events)
    }

    fn sweep_member(
        state: &LendingState,
        member: &Member,
        today: NaiveDate,
        events: &mut Vec<LendingAction>,
        report: &mut SweepReport,
    ) {
        report.members_checked += 1;
        let mut charged = member.clone();
        let before = events.len();
        for rental in state.rentals.overdue_for(member.id, today) {
            if let Some(days) = Self::charge(&mut charged, rental, today, events) {
                report.rentals_charged += 1;
                report.days_charged += u64::from(days);
            }
        }
        if events.len() > before {
            report.members_suspended += 1;
        }
    }

    /// Suspend `member` for the days `rental` still owes
    ///
    /// Outstanding days stack onto the member's suspension, which then runs
    /// until at least today plus the rental's overdue days. `member`
    /// accumulates across calls so several charges in one command stack on
    /// each other. Returns the days newly charged, or `None` when nothing
    /// changed.
    fn charge(
        member: &mut Member,
        rental: &Rental,
        today: NaiveDate,
        events: &mut Vec<LendingAction>,
    ) -> Option<u32> {
        let days = rental.outstanding_penalty(today);
        let floor = days_after(today, rental.overdue_days(today));
        let suspended = member.suspend(days, today).suspended_through(floor);
        if days == 0 && suspended.suspend_until == member.suspend_until {
            return None;
        }
        *member = suspended;
        events.push(LendingAction::MemberSuspended {
            member: member.clone(),
            rental: rental.charged(days),
            days,
        });
        Some(days)
    }

    /// Applies an event to state
    fn apply_event(state: &mut LendingState, action: &LendingAction) {
        match action {
            LendingAction::BookRegistered { book } | LendingAction::StockAdjusted { book } => {
                state.last_book = Some(book.id);
                state.inventory.commit(book.clone());
            },
            LendingAction::MemberRegistered { member } => {
                state.last_member = Some(member.id);
                state.roster.commit(member.clone());
            },
            LendingAction::BookRented { rental, book }
            | LendingAction::BookReturned { rental, book } => {
                state.last_book = Some(book.id);
                state.last_rental = Some(rental.id);
                state.inventory.commit(book.clone());
                state.rentals.commit(rental.clone());
            },
            LendingAction::RentalExtended { rental } => {
                state.last_rental = Some(rental.id);
                state.rentals.commit(rental.clone());
            },
            LendingAction::MemberSuspended { member, rental, .. } => {
                state.last_member = Some(member.id);
                state.roster.commit(member.clone());
                state.rentals.commit(rental.clone());
            },
            LendingAction::OverdueChecked { report } => {
                state.last_sweep = Some(*report);
            },
            LendingAction::CommandRejected { error } => {
                state.last_error = Some(error.clone());
            },
            LendingAction::PersistenceFailed { revision, error } => {
                state.last_persistence_error = Some(PersistenceFailure {
                    revision: *revision,
                    error: error.clone(),
                });
            },
            // Commands are not applied to state
            LendingAction::RegisterBook { .. }
            | LendingAction::AddCopies { .. }
            | LendingAction::RemoveCopies { .. }
            | LendingAction::RegisterMember { .. }
            | LendingAction::Rent { .. }
            | LendingAction::Return { .. }
            | LendingAction::Extend { .. }
            | LendingAction::CheckOverdue { .. }
            | LendingAction::SweepOverdue => {},
        }
    }

    fn record_metrics(event: &LendingAction) {
        match event {
            LendingAction::BookRented { rental, .. } => {
                metrics::counter!("lending.rentals.created").increment(1);
                tracing::info!(
                    rental_id = %rental.id,
                    book_id = %rental.book_id,
                    member_id = %rental.member_id,
                    due_at = %rental.due_at,
                    "Book rented"
                );
            },
            LendingAction::BookReturned { rental, book } => {
                metrics::counter!("lending.rentals.returned").increment(1);
                tracing::info!(
                    rental_id = %rental.id,
                    book_id = %book.id,
                    available = book.available_copies,
                    "Book returned"
                );
            },
            LendingAction::RentalExtended { rental } => {
                metrics::counter!("lending.rentals.extended").increment(1);
                tracing::info!(
                    rental_id = %rental.id,
                    due_at = %rental.due_at,
                    extensions = rental.extension_count,
                    "Rental extended"
                );
            },
            LendingAction::MemberSuspended {
                member,
                rental,
                days,
            } => {
                metrics::counter!("lending.suspensions.days").increment(u64::from(*days));
                tracing::info!(
                    member_id = %member.id,
                    rental_id = %rental.id,
                    days,
                    until = ?member.suspend_until,
                    "Member suspended for overdue rental"
                );
            },
            LendingAction::BookRegistered { book } | LendingAction::StockAdjusted { book } => {
                tracing::info!(
                    book_id = %book.id,
                    total = book.total_copies,
                    available = book.available_copies,
                    "Stock recorded"
                );
            },
            LendingAction::MemberRegistered { member } => {
                tracing::info!(member_id = %member.id, role = %member.role, "Member registered");
            },
            LendingAction::OverdueChecked { report } => {
                tracing::debug!(?report, "Overdue check finished");
            },
            _ => {},
        }
    }

    /// One effect writing every snapshot the events carry
    fn persist(
        state: &LendingState,
        events: &[LendingAction],
        env: &LendingEnvironment,
    ) -> SmallVec<[Effect<LendingAction>; 4]> {
        let mut changes = ChangeSet {
            revision: state.revision,
            ..ChangeSet::default()
        };
        for event in events {
            match event {
                LendingAction::BookRegistered { book } | LendingAction::StockAdjusted { book } => {
                    changes.books.push(book.clone());
                },
                LendingAction::MemberRegistered { member } => {
                    changes.members.push(member.clone());
                },
                LendingAction::MemberSuspended { member, rental, .. } => {
                    changes.members.push(member.clone());
                    changes.rentals.push(rental.clone());
                },
                LendingAction::BookRented { rental, book }
                | LendingAction::BookReturned { rental, book } => {
                    changes.books.push(book.clone());
                    changes.rentals.push(rental.clone());
                },
                LendingAction::RentalExtended { rental } => {
                    changes.rentals.push(rental.clone());
                },
                _ => {},
            }
        }

        if changes.is_empty() {
            return SmallVec::new();
        }

        let repositories = env.repositories.clone();
        let revision = changes.revision;
        smallvec![Effect::future(async move {
            match repositories.save(changes).await {
                Ok(()) => None,
                Err(error) => {
                    tracing::error!(%error, revision, "Failed to persist committed change");
                    Some(LendingAction::PersistenceFailed {
                        revision,
                        error: error.to_string(),
                    })
                },
            }
        })]
    }
}

impl Reducer for LendingReducer {
    type State = LendingState;
    type Action = LendingAction;
    type Environment = LendingEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let decision = match action {
            // ========== Commands ==========
            LendingAction::RegisterBook {
                isbn,
                title,
                author,
                total_copies,
            } => Self::decide_register_book(state, env, &isbn, &title, &author, total_copies),
            LendingAction::AddCopies { book_id, quantity } => state
                .inventory
                .add_copies(book_id, quantity)
                .map(|book| vec![LendingAction::StockAdjusted { book }]),
            LendingAction::RemoveCopies { book_id, quantity } => state
                .inventory
                .remove_copies(book_id, quantity)
                .map(|book| vec![LendingAction::StockAdjusted { book }]),
            LendingAction::RegisterMember {
                name,
                email,
                credential,
                role,
            } => Self::decide_register_member(state, env, &name, &email, credential, role),
            LendingAction::Rent { book_id, member_id } => {
                Self::decide_rent(state, env, book_id, member_id)
            },
            LendingAction::Return { rental_id } => Self::decide_return(state, env, rental_id),
            LendingAction::Extend { rental_id } => Self::decide_extend(state, env, rental_id),
            LendingAction::CheckOverdue { member_id } => {
                Self::decide_check_overdue(state, env, member_id)
            },
            LendingAction::SweepOverdue => Self::decide_sweep(state, env),

            // ========== Events ==========
            event => {
                // Events are applied (for replay or effect feedback)
                Self::apply_event(state, &event);
                return SmallVec::new();
            },
        };

        state.begin_command();
        match decision {
            Ok(events) => {
                state.revision += 1;
                for event in &events {
                    Self::apply_event(state, event);
                    Self::record_metrics(event);
                }
                Self::persist(state, &events, env)
            },
            Err(error) => {
                let kind = error.kind();
                metrics::counter!("lending.commands.rejected", "kind" => kind.as_str())
                    .increment(1);
                tracing::warn!(%error, kind = %kind, "Command rejected");
                Self::apply_event(state, &LendingAction::CommandRejected { error });
                SmallVec::new()
            },
        }
    }
}
