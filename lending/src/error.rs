//! Error taxonomy for lending commands.
//!
//! [`LendingError`] covers every business rule a command can break. All of
//! them are recoverable: a rejected command leaves state exactly as it was.
//! Storage and runtime failures are kept apart in
//! [`RepositoryError`](crate::repository::RepositoryError) and
//! [`DeskError`](crate::desk::DeskError).

use crate::types::{BookId, RentalId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Kind of entity a lookup was looking for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Entity {
    /// A catalogued title
    Book,
    /// A library member
    Member,
    /// A borrow transaction
    Rental,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Book => write!(f, "book"),
            Self::Member => write!(f, "member"),
            Self::Rental => write!(f, "rental"),
        }
    }
}

/// A lending command broke a business rule
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LendingError {
    /// Malformed input (blank fields, negative counts, bad email)
    #[error("invalid input: {0}")]
    Validation(String),

    /// Uniqueness violated (ISBN or email already registered)
    #[error("conflict: {0}")]
    Conflict(String),

    /// No entity with the given id
    #[error("{entity} {id} not found")]
    NotFound {
        /// What was being looked up
        entity: Entity,
        /// The id that missed
        id: Uuid,
    },

    /// No copy left to lend, or not enough copies to write off
    #[error("book {book_id} is out of stock")]
    OutOfStock {
        /// The exhausted title
        book_id: BookId,
    },

    /// The member already holds the maximum number of rentals
    #[error("borrow limit of {limit} active rentals reached")]
    BorrowLimit {
        /// Active rentals allowed per regular member
        limit: u32,
    },

    /// The member is serving an overdue penalty
    #[error("member is suspended until {until}")]
    Suspended {
        /// First day the member may borrow again
        until: NaiveDate,
    },

    /// The member has at least one overdue rental
    #[error("member has {overdue} overdue rental(s)")]
    OverdueBlock {
        /// Number of overdue rentals
        overdue: usize,
    },

    /// The rental was already closed
    #[error("rental {rental_id} was already returned")]
    AlreadyReturned {
        /// The closed rental
        rental_id: RentalId,
    },

    /// The rental reached the configured extension cap
    #[error("rental {rental_id} has already been extended {max} time(s)")]
    ExtensionLimit {
        /// The rental being extended
        rental_id: RentalId,
        /// Configured cap
        max: u32,
    },
}

impl LendingError {
    /// Shorthand for a missing book
    #[must_use]
    pub const fn book_not_found(id: BookId) -> Self {
        Self::NotFound {
            entity: Entity::Book,
            id: *id.as_uuid(),
        }
    }

    /// Shorthand for a missing member
    #[must_use]
    pub const fn member_not_found(id: crate::types::MemberId) -> Self {
        Self::NotFound {
            entity: Entity::Member,
            id: *id.as_uuid(),
        }
    }

    /// Shorthand for a missing rental
    #[must_use]
    pub const fn rental_not_found(id: RentalId) -> Self {
        Self::NotFound {
            entity: Entity::Rental,
            id: *id.as_uuid(),
        }
    }

    /// Stable classification for callers that map errors to messages
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::OutOfStock { .. } => ErrorKind::OutOfStock,
            Self::BorrowLimit { .. } => ErrorKind::BorrowLimit,
            Self::Suspended { .. } => ErrorKind::Suspended,
            Self::OverdueBlock { .. } => ErrorKind::OverdueBlock,
            Self::AlreadyReturned { .. } => ErrorKind::AlreadyReturned,
            Self::ExtensionLimit { .. } => ErrorKind::ExtensionLimit,
        }
    }
}

/// Classification of a [`LendingError`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed input
    Validation,
    /// Uniqueness violated
    Conflict,
    /// Unknown id
    NotFound,
    /// No copies available
    OutOfStock,
    /// Too many active rentals
    BorrowLimit,
    /// Member suspended
    Suspended,
    /// Member has overdue rentals
    OverdueBlock,
    /// Rental already closed
    AlreadyReturned,
    /// Extension cap reached
    ExtensionLimit,
}

impl ErrorKind {
    /// Label used in metrics and logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::OutOfStock => "out_of_stock",
            Self::BorrowLimit => "borrow_limit",
            Self::Suspended => "suspended",
            Self::OverdueBlock => "overdue_block",
            Self::AlreadyReturned => "already_returned",
            Self::ExtensionLimit => "extension_limit",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_names_entity() {
        let id = RentalId::from_uuid(Uuid::from_u128(7));
        let error = LendingError::rental_not_found(id);
        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert!(error.to_string().starts_with("rental "));
        assert!(error.to_string().ends_with("not found"));
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(LendingError::OverdueBlock { overdue: 2 }.kind().as_str(), "overdue_block");
        assert_eq!(
            LendingError::BorrowLimit { limit: 7 }.to_string(),
            "borrow limit of 7 active rentals reached"
        );
    }
}
