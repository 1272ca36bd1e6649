//! Stock bookkeeping holds under arbitrary command sequences.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use bookrental::{
    Book, BookId, Credential, LendingAction, LendingEnvironment, LendingPolicy, LendingReducer,
    LendingState, MemberId, Rental, RentalId, Repositories, Role,
};
use bookrental_core::reducer::Reducer;
use bookrental_testing::{ManualClock, SequentialIds, test_date};
use proptest::prelude::*;
use std::sync::Arc;

#[derive(Clone, Debug)]
enum Op {
    Register { total: i64 },
    Rent { book: usize, member: usize },
    Return { rental: usize },
    Extend { rental: usize },
    Add { book: usize, quantity: i64 },
    Remove { book: usize, quantity: i64 },
    Advance { days: u64 },
    Sweep,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (-1i64..4).prop_map(|total| Op::Register { total }),
        (0usize..6, 0usize..2).prop_map(|(book, member)| Op::Rent { book, member }),
        (0usize..12).prop_map(|rental| Op::Return { rental }),
        (0usize..12).prop_map(|rental| Op::Extend { rental }),
        (0usize..6, -1i64..3).prop_map(|(book, quantity)| Op::Add { book, quantity }),
        (0usize..6, -1i64..3).prop_map(|(book, quantity)| Op::Remove { book, quantity }),
        (1u64..20).prop_map(|days| Op::Advance { days }),
        Just(Op::Sweep),
    ]
}

/// Reducer, state and the ids handed out so far
struct Harness {
    reducer: LendingReducer,
    env: LendingEnvironment,
    clock: ManualClock,
    state: LendingState,
    books: Vec<BookId>,
    members: Vec<MemberId>,
    rentals: Vec<RentalId>,
    registered: usize,
}

impl Harness {
    fn new() -> Self {
        let clock = ManualClock::on(test_date());
        let env = LendingEnvironment::new(
            Arc::new(clock.clone()),
            Arc::new(SequentialIds::new()),
            Repositories::in_memory(),
            LendingPolicy::default(),
        );
        let mut harness = Self {
            reducer: LendingReducer::new(),
            env,
            clock,
            state: LendingState::default(),
            books: Vec::new(),
            members: Vec::new(),
            rentals: Vec::new(),
            registered: 0,
        };
        for (name, role) in [("user", Role::User), ("admin", Role::Admin)] {
            harness.send(LendingAction::RegisterMember {
                name: name.to_string(),
                email: format!("{name}@example.com"),
                credential: Credential::new("h"),
                role,
            });
            let id = harness.state.last_member.unwrap();
            harness.members.push(id);
        }
        harness
    }

    fn send(&mut self, action: LendingAction) {
        // Effects only persist; the state is what matters here
        let _ = self.reducer.reduce(&mut self.state, action, &self.env);
    }

    fn books(&self) -> Vec<Book> {
        self.state.inventory.iter().cloned().collect()
    }

    fn rentals(&self) -> Vec<Rental> {
        self.members
            .iter()
            .flat_map(|member| self.state.rentals.by_member(*member).cloned())
            .collect()
    }

    fn action_for(&mut self, op: &Op) -> Option<LendingAction> {
        let pick = |ids: &[BookId], index: usize| ids.get(index % ids.len().max(1)).copied();
        let action = match *op {
            Op::Register { total } => {
                self.registered += 1;
                LendingAction::RegisterBook {
                    isbn: format!("isbn-{}", self.registered),
                    title: "Title".to_string(),
                    author: "Author".to_string(),
                    total_copies: total,
                }
            }
            Op::Rent { book, member } => LendingAction::Rent {
                book_id: pick(&self.books, book)?,
                member_id: self.members[member % self.members.len()],
            },
            Op::Return { rental } => LendingAction::Return {
                rental_id: *self.rentals.get(rental % self.rentals.len().max(1))?,
            },
            Op::Extend { rental } => LendingAction::Extend {
                rental_id: *self.rentals.get(rental % self.rentals.len().max(1))?,
            },
            Op::Add { book, quantity } => LendingAction::AddCopies {
                book_id: pick(&self.books, book)?,
                quantity,
            },
            Op::Remove { book, quantity } => LendingAction::RemoveCopies {
                book_id: pick(&self.books, book)?,
                quantity,
            },
            Op::Advance { days } => {
                self.clock.advance_days(days);
                return None;
            }
            Op::Sweep => LendingAction::SweepOverdue,
        };
        Some(action)
    }

    fn apply(&mut self, op: &Op) {
        let Some(action) = self.action_for(op) else {
            return;
        };
        let is_rent = matches!(action, LendingAction::Rent { .. });
        let is_register = matches!(action, LendingAction::RegisterBook { .. });

        let books_before = self.books();
        let rentals_before = self.rentals();
        let revision_before = self.state.revision;

        self.send(action);

        if self.state.last_error.is_some() {
            assert_eq!(self.books(), books_before, "rejected {op:?} changed stock");
            assert_eq!(self.rentals(), rentals_before, "rejected {op:?} changed rentals");
            assert_eq!(self.state.revision, revision_before);
            return;
        }

        assert_eq!(self.state.revision, revision_before + 1);
        if is_register {
            self.books.push(self.state.last_book.unwrap());
        }
        if is_rent {
            self.rentals.push(self.state.last_rental.unwrap());
        }
    }

    fn check_stock(&self) {
        let rentals = self.rentals();
        for book in self.state.inventory.iter() {
            assert!(
                book.available_copies <= book.total_copies,
                "{} has {} of {} on the shelf",
                book.isbn,
                book.available_copies,
                book.total_copies
            );
            let active = rentals
                .iter()
                .filter(|rental| rental.book_id == book.id && rental.is_active())
                .count();
            assert_eq!(book.on_loan() as usize, active, "{} loan count drifted", book.isbn);
        }
    }
}

proptest! {
    #[test]
    fn stock_stays_consistent(ops in prop::collection::vec(arb_op(), 1..60)) {
        let mut harness = Harness::new();
        for op in &ops {
            harness.apply(op);
            harness.check_stock();
        }
    }

    #[test]
    fn returned_rentals_cannot_be_returned_again(copies in 1i64..4, days in 0u64..40) {
        let mut harness = Harness::new();
        harness.apply(&Op::Register { total: copies });
        harness.apply(&Op::Rent { book: 0, member: 0 });
        harness.apply(&Op::Advance { days: days.max(1) });
        harness.apply(&Op::Return { rental: 0 });
        let stock = harness.books();

        harness.apply(&Op::Return { rental: 0 });
        prop_assert!(harness.state.last_error.is_some());
        prop_assert_eq!(harness.books(), stock);
        harness.check_stock();
    }
}
