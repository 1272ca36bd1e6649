//! Book inventory: total versus available copies per title.
//!
//! Every operation is a *decision*: it validates against the current
//! inventory and returns the updated [`Book`] without storing it. The
//! lifecycle reducer commits the result with [`Inventory::commit`] only once
//! the whole command has been validated, which is what keeps a stock change
//! and its rental transition atomic.
//!
//! For every book, `available_copies <= total_copies` holds after every
//! operation; `u32` rules out negative counts.

use crate::error::LendingError;
use crate::types::BookId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A catalogued title and its stock
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Identifier
    pub id: BookId,
    /// ISBN, unique across the catalogue (case-insensitive)
    pub isbn: String,
    /// Title
    pub title: String,
    /// Author
    pub author: String,
    /// Copies owned by the library
    pub total_copies: u32,
    /// Copies on the shelf
    pub available_copies: u32,
}

impl Book {
    /// Copies currently lent out
    #[must_use]
    pub const fn on_loan(&self) -> u32 {
        self.total_copies.saturating_sub(self.available_copies)
    }

    /// Whether at least one copy can be lent
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.available_copies > 0
    }

    /// One copy leaves the shelf
    ///
    /// # Errors
    ///
    /// [`LendingError::OutOfStock`] if no copy is available.
    pub fn checked_out(&self) -> Result<Self, LendingError> {
        if !self.is_available() {
            return Err(LendingError::OutOfStock { book_id: self.id });
        }
        Ok(Self {
            available_copies: self.available_copies - 1,
            ..self.clone()
        })
    }

    /// One copy comes back, never exceeding the total
    #[must_use]
    pub fn checked_in(&self) -> Self {
        Self {
            available_copies: self
                .available_copies
                .saturating_add(1)
                .min(self.total_copies),
            ..self.clone()
        }
    }

    /// `quantity` new copies join the collection
    ///
    /// # Errors
    ///
    /// [`LendingError::Validation`] unless `quantity >= 1` and the totals stay
    /// representable.
    pub fn restocked(&self, quantity: i64) -> Result<Self, LendingError> {
        let quantity = positive_quantity(quantity)?;
        let (Some(total), Some(available)) = (
            self.total_copies.checked_add(quantity),
            self.available_copies.checked_add(quantity),
        ) else {
            return Err(LendingError::Validation(
                "copy count is too large".to_string(),
            ));
        };
        Ok(Self {
            total_copies: total,
            available_copies: available,
            ..self.clone()
        })
    }

    /// `quantity` shelved copies are written off
    ///
    /// # Errors
    ///
    /// [`LendingError::Validation`] unless `quantity >= 1`;
    /// [`LendingError::OutOfStock`] if fewer than `quantity` copies are on the shelf.
    pub fn written_off(&self, quantity: i64) -> Result<Self, LendingError> {
        let quantity = positive_quantity(quantity)?;
        if self.available_copies < quantity {
            return Err(LendingError::OutOfStock { book_id: self.id });
        }
        Ok(Self {
            total_copies: self.total_copies - quantity,
            available_copies: self.available_copies - quantity,
            ..self.clone()
        })
    }

    /// Case-insensitive substring match on title, author or ISBN
    ///
    /// `needle` must already be lowercase.
    fn matches(&self, needle: &str) -> bool {
        [&self.title, &self.author, &self.isbn]
            .iter()
            .any(|field| field.to_lowercase().contains(needle))
    }
}

fn positive_quantity(quantity: i64) -> Result<u32, LendingError> {
    if quantity < 1 {
        return Err(LendingError::Validation(format!(
            "quantity must be at least 1, got {quantity}"
        )));
    }
    u32::try_from(quantity)
        .map_err(|_| LendingError::Validation(format!("quantity {quantity} is too large")))
}

fn require(field: &str, value: &str) -> Result<(), LendingError> {
    if value.trim().is_empty() {
        return Err(LendingError::Validation(format!("{field} cannot be blank")));
    }
    Ok(())
}

/// All catalogued titles, in registration order
#[derive(Clone, Debug, Default)]
pub struct Inventory {
    books: HashMap<BookId, Book>,
    order: Vec<BookId>,
}

impl Inventory {
    /// Number of titles
    #[must_use]
    pub fn len(&self) -> usize {
        self.books.len()
    }

    /// Whether the catalogue is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    /// Look up a title
    #[must_use]
    pub fn get(&self, id: BookId) -> Option<&Book> {
        self.books.get(&id)
    }

    /// Look up a title that must exist
    ///
    /// # Errors
    ///
    /// [`LendingError::NotFound`] if no such book.
    pub fn book(&self, id: BookId) -> Result<&Book, LendingError> {
        self.get(id).ok_or(LendingError::book_not_found(id))
    }

    /// Look up a title by ISBN, ignoring case
    #[must_use]
    pub fn find_by_isbn(&self, isbn: &str) -> Option<&Book> {
        let isbn = isbn.trim();
        self.iter().find(|book| book.isbn.eq_ignore_ascii_case(isbn))
    }

    /// Validate a new title
    ///
    /// Returns the book with every copy on the shelf.
    ///
    /// # Errors
    ///
    /// [`LendingError::Validation`] for blank fields or a negative count,
    /// [`LendingError::Conflict`] if the ISBN is taken.
    pub fn register(
        &self,
        id: BookId,
        isbn: &str,
        title: &str,
        author: &str,
        total_copies: i64,
    ) -> Result<Book, LendingError> {
        require("isbn", isbn)?;
        require("title", title)?;
        require("author", author)?;
        if total_copies < 0 {
            return Err(LendingError::Validation(format!(
                "total copies cannot be negative, got {total_copies}"
            )));
        }
        let total_copies = u32::try_from(total_copies).map_err(|_| {
            LendingError::Validation(format!("total copies {total_copies} is too large"))
        })?;
        if self.find_by_isbn(isbn).is_some() {
            return Err(LendingError::Conflict(format!(
                "isbn {} is already registered",
                isbn.trim()
            )));
        }

        Ok(Book {
            id,
            isbn: isbn.trim().to_string(),
            title: title.trim().to_string(),
            author: author.trim().to_string(),
            total_copies,
            available_copies: total_copies,
        })
    }

    /// Take one copy of `id` off the shelf
    ///
    /// # Errors
    ///
    /// [`LendingError::NotFound`] or [`LendingError::OutOfStock`].
    pub fn decrement_available(&self, id: BookId) -> Result<Book, LendingError> {
        self.book(id)?.checked_out()
    }

    /// Put one copy of `id` back, capped at its total
    ///
    /// # Errors
    ///
    /// [`LendingError::NotFound`] if no such book.
    pub fn increment_available(&self, id: BookId) -> Result<Book, LendingError> {
        Ok(self.book(id)?.checked_in())
    }

    /// Add `quantity` copies of `id`
    ///
    /// # Errors
    ///
    /// [`LendingError::NotFound`] or [`LendingError::Validation`].
    pub fn add_copies(&self, id: BookId, quantity: i64) -> Result<Book, LendingError> {
        self.book(id)?.restocked(quantity)
    }

    /// Write off `quantity` shelved copies of `id`
    ///
    /// # Errors
    ///
    /// [`LendingError::NotFound`], [`LendingError::Validation`] or
    /// [`LendingError::OutOfStock`].
    pub fn remove_copies(&self, id: BookId, quantity: i64) -> Result<Book, LendingError> {
        self.book(id)?.written_off(quantity)
    }

    /// Store a validated book, inserting or replacing it
    pub fn commit(&mut self, book: Book) {
        if !self.books.contains_key(&book.id) {
            self.order.push(book.id);
        }
        self.books.insert(book.id, book);
    }

    /// Titles whose title, author or ISBN contains `keyword`, ignoring case
    ///
    /// A blank keyword matches everything.
    #[must_use]
    pub fn search(&self, keyword: &str) -> Vec<&Book> {
        let needle = keyword.trim().to_lowercase();
        if needle.is_empty() {
            return self.iter().collect();
        }
        self.iter().filter(|book| book.matches(&needle)).collect()
    }

    /// All titles in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Book> {
        self.order.iter().filter_map(|id| self.books.get(id))
    }
}
