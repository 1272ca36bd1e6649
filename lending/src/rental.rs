//! Rental record: one borrow transaction and its two-state lifecycle.
//!
//! ```text
//! RENTED ──mark_returned──▶ RETURNED
//!   │ ▲
//!   └─┘ extend
//! ```
//!
//! `returned_at` is set exactly when the status is `Returned`, and
//! `due_at >= rented_at` always holds.

use crate::error::LendingError;
use crate::types::{BookId, MemberId, RentalId, days_after};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle state of a rental
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RentalStatus {
    /// The book is with the member
    Rented,
    /// The book is back (terminal)
    Returned,
}

/// One borrow transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rental {
    /// Identifier
    pub id: RentalId,
    /// Borrowed title
    pub book_id: BookId,
    /// Borrowing member
    pub member_id: MemberId,
    /// Day the rental started
    pub rented_at: NaiveDate,
    /// Day the book is due back
    pub due_at: NaiveDate,
    /// Day the book came back
    pub returned_at: Option<NaiveDate>,
    /// Lifecycle state
    pub status: RentalStatus,
    /// Times the due date was pushed back
    pub extension_count: u32,
    /// Overdue days already charged to the member as suspension
    #[serde(default)]
    pub penalty_days: u32,
}

impl Rental {
    /// A fresh rental due `loan_days` after `rented_at`
    #[must_use]
    pub fn open(
        id: RentalId,
        book_id: BookId,
        member_id: MemberId,
        rented_at: NaiveDate,
        loan_days: u32,
    ) -> Self {
        Self {
            id,
            book_id,
            member_id,
            rented_at,
            due_at: days_after(rented_at, loan_days),
            returned_at: None,
            status: RentalStatus::Rented,
            extension_count: 0,
            penalty_days: 0,
        }
    }

    /// Whether the book is still out
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == RentalStatus::Rented
    }

    /// Still out and past its due date on `as_of`
    #[must_use]
    pub fn is_overdue(&self, as_of: NaiveDate) -> bool {
        self.is_active() && self.due_at < as_of
    }

    /// Whole days past due on `as_of`, zero unless overdue
    #[must_use]
    pub fn overdue_days(&self, as_of: NaiveDate) -> u32 {
        if !self.is_overdue(as_of) {
            return 0;
        }
        let days = (as_of - self.due_at).num_days();
        u32::try_from(days).unwrap_or(u32::MAX)
    }

    /// Overdue days on `as_of` not yet charged
    #[must_use]
    pub fn outstanding_penalty(&self, as_of: NaiveDate) -> u32 {
        self.overdue_days(as_of).saturating_sub(self.penalty_days)
    }

    /// The rental with `days` more recorded as charged
    #[must_use]
    pub fn charged(&self, days: u32) -> Self {
        Self {
            penalty_days: self.penalty_days.saturating_add(days),
            ..self.clone()
        }
    }

    /// Close the rental on `date`
    ///
    /// Inventory is not touched here.
    ///
    /// # Errors
    ///
    /// [`LendingError::AlreadyReturned`] if the rental is already closed.
    pub fn mark_returned(&self, date: NaiveDate) -> Result<Self, LendingError> {
        if !self.is_active() {
            return Err(LendingError::AlreadyReturned { rental_id: self.id });
        }
        Ok(Self {
            returned_at: Some(date),
            status: RentalStatus::Returned,
            ..self.clone()
        })
    }

    /// Push the due date back by `days`
    ///
    /// # Errors
    ///
    /// [`LendingError::AlreadyReturned`] if the rental is already closed.
    pub fn extend(&self, days: u32) -> Result<Self, LendingError> {
        if !self.is_active() {
            return Err(LendingError::AlreadyReturned { rental_id: self.id });
        }
        Ok(Self {
            due_at: days_after(self.due_at, days),
            extension_count: self.extension_count.saturating_add(1),
            ..self.clone()
        })
    }
}

/// Every rental ever opened, indexed by member
#[derive(Clone, Debug, Default)]
pub struct RentalLedger {
    rentals: HashMap<RentalId, Rental>,
    by_member: HashMap<MemberId, Vec<RentalId>>,
}

impl RentalLedger {
    /// Number of rentals, open or closed
    #[must_use]
    pub fn len(&self) -> usize {
        self.rentals.len()
    }

    /// Whether no rental was ever opened
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rentals.is_empty()
    }

    /// Look up a rental
    #[must_use]
    pub fn get(&self, id: RentalId) -> Option<&Rental> {
        self.rentals.get(&id)
    }

    /// Look up a rental that must exist
    ///
    /// # Errors
    ///
    /// [`LendingError::NotFound`] if no such rental.
    pub fn rental(&self, id: RentalId) -> Result<&Rental, LendingError> {
        self.get(id).ok_or(LendingError::rental_not_found(id))
    }

    /// A member's rentals, oldest first
    pub fn by_member(&self, member_id: MemberId) -> impl Iterator<Item = &Rental> {
        self.by_member
            .get(&member_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.rentals.get(id))
    }

    /// A member's rentals that are still out
    pub fn active_for(&self, member_id: MemberId) -> impl Iterator<Item = &Rental> {
        self.by_member(member_id).filter(|rental| rental.is_active())
    }

    /// A member's rentals that are overdue on `as_of`
    pub fn overdue_for(
        &self,
        member_id: MemberId,
        as_of: NaiveDate,
    ) -> impl Iterator<Item = &Rental> {
        self.by_member(member_id)
            .filter(move |rental| rental.is_overdue(as_of))
    }

    /// Store a rental, inserting or replacing it
    pub fn commit(&mut self, rental: Rental) {
        if !self.rentals.contains_key(&rental.id) {
            self.by_member
                .entry(rental.member_id)
                .or_default()
                .push(rental.id);
        }
        self.rentals.insert(rental.id, rental);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use uuid::Uuid;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn rental(n: u128, member: u128, rented_at: NaiveDate) -> Rental {
        Rental::open(
            RentalId::from_uuid(Uuid::from_u128(n)),
            BookId::from_uuid(Uuid::from_u128(100)),
            MemberId::from_uuid(Uuid::from_u128(member)),
            rented_at,
            14,
        )
    }

    #[test]
    fn test_open_is_due_after_loan_period() {
        let rental = rental(1, 1, day(1));
        assert_eq!(rental.due_at, day(15));
        assert_eq!(rental.status, RentalStatus::Rented);
        assert_eq!(rental.returned_at, None);
        assert_eq!(rental.extension_count, 0);
    }

    #[test]
    fn test_overdue_starts_the_day_after_due() {
        let rental = rental(1, 1, day(1));
        assert!(!rental.is_overdue(day(15)));
        assert_eq!(rental.overdue_days(day(15)), 0);
        assert!(rental.is_overdue(day(16)));
        assert_eq!(rental.overdue_days(day(20)), 5);
    }

    #[test]
    fn test_returned_rental_is_never_overdue() {
        let returned = rental(1, 1, day(1)).mark_returned(day(30)).unwrap();
        assert_eq!(returned.status, RentalStatus::Returned);
        assert_eq!(returned.returned_at, Some(day(30)));
        assert!(!returned.is_overdue(day(31)));
        assert_eq!(returned.overdue_days(day(31)), 0);
    }

    #[test]
    fn test_outstanding_penalty_excludes_charged_days() {
        let rental = rental(1, 1, day(1));
        assert_eq!(rental.outstanding_penalty(day(20)), 5);

        let charged = rental.charged(5);
        assert_eq!(charged.penalty_days, 5);
        assert_eq!(charged.outstanding_penalty(day(20)), 0);
        assert_eq!(charged.outstanding_penalty(day(23)), 3);

        // The charge survives closing
        let closed = charged.mark_returned(day(23)).unwrap();
        assert_eq!(closed.penalty_days, 5);
        assert_eq!(closed.outstanding_penalty(day(30)), 0);
    }

    #[test]
    fn test_mark_returned_twice_fails() {
        let returned = rental(1, 1, day(1)).mark_returned(day(2)).unwrap();
        let error = returned.mark_returned(day(3)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::AlreadyReturned);
    }

    #[test]
    fn test_extend_pushes_due_date_and_counts() {
        let extended = rental(1, 1, day(1)).extend(14).unwrap().extend(7).unwrap();
        assert_eq!(extended.due_at, day(15) + chrono::Days::new(21));
        assert_eq!(extended.extension_count, 2);

        let closed = extended.mark_returned(day(2)).unwrap();
        assert_eq!(closed.extend(14).unwrap_err().kind(), ErrorKind::AlreadyReturned);
    }

    #[test]
    fn test_ledger_indexes_by_member() {
        let mut ledger = RentalLedger::default();
        ledger.commit(rental(1, 1, day(1)));
        ledger.commit(rental(2, 2, day(1)));
        let late = rental(3, 1, day(2));
        ledger.commit(late.clone());
        ledger.commit(late.mark_returned(day(3)).unwrap());

        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.by_member(MemberId::from_uuid(Uuid::from_u128(1))).count(), 2);
        assert_eq!(ledger.active_for(MemberId::from_uuid(Uuid::from_u128(1))).count(), 1);
        assert_eq!(
            ledger
                .overdue_for(MemberId::from_uuid(Uuid::from_u128(2)), day(20))
                .count(),
            1
        );
        assert_eq!(
            ledger.rental(RentalId::from_uuid(Uuid::from_u128(9))).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }
}
