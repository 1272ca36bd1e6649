//! Member standing: who may borrow, and until when they may not.
//!
//! A suspension is a single `suspend_until` date. Penalties stack: a member
//! already suspended has the new days added to the existing end date rather
//! than counted from today. A charge for an overdue rental never leaves the
//! member free before today plus the rental's overdue days.

use crate::error::LendingError;
use crate::types::{Credential, MemberId, Role, days_after};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

static EMAIL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[\w.+-]+@[\w-]+(\.[\w-]+)*\.[A-Za-z]{2,}$").ok());

/// A library member
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Identifier
    pub id: MemberId,
    /// Display name
    pub name: String,
    /// Email, unique across members (case-insensitive)
    pub email: String,
    /// Hashed password
    pub credential: Credential,
    /// Role
    pub role: Role,
    /// End of the current suspension, if any
    pub suspend_until: Option<NaiveDate>,
}

impl Member {
    /// Whether the member is suspended on `as_of`
    ///
    /// A suspension ending on `as_of` has already lapsed.
    #[must_use]
    pub fn is_suspended(&self, as_of: NaiveDate) -> bool {
        self.suspend_until.is_some_and(|until| until > as_of)
    }

    /// Add `days` of suspension
    ///
    /// Counts from `today` when the member is in good standing and from the
    /// current end date when already suspended. Zero days changes nothing.
    #[must_use]
    pub fn suspend(&self, days: u32, today: NaiveDate) -> Self {
        if days == 0 {
            return self.clone();
        }
        let from = match self.suspend_until {
            Some(until) if until > today => until,
            _ => today,
        };
        Self {
            suspend_until: Some(days_after(from, days)),
            ..self.clone()
        }
    }

    /// Suspended until at least `until`
    ///
    /// A later existing end date is kept.
    #[must_use]
    pub fn suspended_through(&self, until: NaiveDate) -> Self {
        if self.suspend_until.is_some_and(|current| current >= until) {
            return self.clone();
        }
        Self {
            suspend_until: Some(until),
            ..self.clone()
        }
    }

    /// Whether borrow limits apply to this member
    #[must_use]
    pub const fn is_limited(&self) -> bool {
        matches!(self.role, Role::User)
    }
}

/// All members, in sign-up order
#[derive(Clone, Debug, Default)]
pub struct Roster {
    members: HashMap<MemberId, Member>,
    order: Vec<MemberId>,
}

impl Roster {
    /// Number of members
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether nobody has signed up
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Look up a member
    #[must_use]
    pub fn get(&self, id: MemberId) -> Option<&Member> {
        self.members.get(&id)
    }

    /// Look up a member that must exist
    ///
    /// # Errors
    ///
    /// [`LendingError::NotFound`] if no such member.
    pub fn member(&self, id: MemberId) -> Result<&Member, LendingError> {
        self.get(id).ok_or(LendingError::member_not_found(id))
    }

    /// Look up a member by email, ignoring case
    #[must_use]
    pub fn find_by_email(&self, email: &str) -> Option<&Member> {
        let email = email.trim();
        self.iter()
            .find(|member| member.email.eq_ignore_ascii_case(email))
    }

    /// Validate a sign-up
    ///
    /// # Errors
    ///
    /// [`LendingError::Validation`] for blank fields or a malformed email,
    /// [`LendingError::Conflict`] if the email is taken.
    pub fn sign_up(
        &self,
        id: MemberId,
        name: &str,
        email: &str,
        credential: Credential,
        role: Role,
    ) -> Result<Member, LendingError> {
        if name.trim().is_empty() {
            return Err(LendingError::Validation("name cannot be blank".to_string()));
        }
        let email = email.trim();
        if email.is_empty() {
            return Err(LendingError::Validation("email cannot be blank".to_string()));
        }
        if !EMAIL.as_ref().is_some_and(|pattern| pattern.is_match(email)) {
            return Err(LendingError::Validation(format!(
                "{email} is not a valid email address"
            )));
        }
        if credential.is_blank() {
            return Err(LendingError::Validation(
                "credential cannot be blank".to_string(),
            ));
        }
        if self.find_by_email(email).is_some() {
            return Err(LendingError::Conflict(format!(
                "email {email} is already registered"
            )));
        }

        Ok(Member {
            id,
            name: name.trim().to_string(),
            email: email.to_string(),
            credential,
            role,
            suspend_until: None,
        })
    }

    /// Store a validated member, inserting or replacing them
    pub fn commit(&mut self, member: Member) {
        if !self.members.contains_key(&member.id) {
            self.order.push(member.id);
        }
        self.members.insert(member.id, member);
    }

    /// All members in sign-up order
    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.order.iter().filter_map(|id| self.members.get(id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use uuid::Uuid;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn member() -> Member {
        Roster::default()
            .sign_up(
                MemberId::from_uuid(Uuid::from_u128(1)),
                "Ada",
                "ada@example.com",
                Credential::new("hash"),
                Role::User,
            )
            .unwrap()
    }

    #[test]
    fn test_new_member_is_in_good_standing() {
        let ada = member();
        assert_eq!(ada.suspend_until, None);
        assert!(!ada.is_suspended(day(1)));
        assert!(ada.is_limited());
    }

    #[test]
    fn test_suspension_counts_from_today_when_not_suspended() {
        let ada = member().suspend(5, day(1));
        assert_eq!(ada.suspend_until, Some(day(6)));
        assert!(ada.is_suspended(day(5)));
        assert!(!ada.is_suspended(day(6)));
    }

    #[test]
    fn test_suspension_stacks_on_active_suspension() {
        let ada = member().suspend(5, day(1)).suspend(3, day(2));
        assert_eq!(ada.suspend_until, Some(day(9)));
    }

    #[test]
    fn test_expired_suspension_restarts_from_today() {
        let ada = member().suspend(2, day(1)).suspend(4, day(10));
        assert_eq!(ada.suspend_until, Some(day(14)));
    }

    #[test]
    fn test_suspended_through_only_raises_the_end_date() {
        let ada = member().suspended_through(day(10));
        assert_eq!(ada.suspend_until, Some(day(10)));
        assert_eq!(ada.suspended_through(day(7)).suspend_until, Some(day(10)));
        assert_eq!(ada.suspended_through(day(12)).suspend_until, Some(day(12)));
    }

    #[test]
    fn test_zero_days_is_a_no_op() {
        let ada = member();
        assert_eq!(ada.suspend(0, day(1)), ada);
    }

    #[test]
    fn test_sign_up_validation() {
        let roster = Roster::default();
        let attempt = |name: &str, email: &str, secret: &str| {
            roster
                .sign_up(
                    MemberId::from_uuid(Uuid::from_u128(2)),
                    name,
                    email,
                    Credential::new(secret),
                    Role::User,
                )
                .map_err(|e| e.kind())
        };

        assert_eq!(attempt("", "a@b.io", "h").unwrap_err(), ErrorKind::Validation);
        assert_eq!(attempt("A", " ", "h").unwrap_err(), ErrorKind::Validation);
        assert_eq!(attempt("A", "not-an-email", "h").unwrap_err(), ErrorKind::Validation);
        assert_eq!(attempt("A", "a@b", "h").unwrap_err(), ErrorKind::Validation);
        assert_eq!(attempt("A", "a@b.io", " ").unwrap_err(), ErrorKind::Validation);
        assert!(attempt("A", "first.last+tag@mail.example.org", "h").is_ok());
    }

    #[test]
    fn test_sign_up_rejects_taken_email_ignoring_case() {
        let mut roster = Roster::default();
        roster.commit(member());

        let error = roster
            .sign_up(
                MemberId::from_uuid(Uuid::from_u128(2)),
                "Imposter",
                "ADA@Example.com",
                Credential::new("hash"),
                Role::Admin,
            )
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Conflict);
        assert_eq!(roster.iter().count(), 1);
    }
}
