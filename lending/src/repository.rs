//! Storage providers for books, members and rentals.
//!
//! The lifecycle engine never calls these directly. It hydrates its state
//! from them once, at [`LendingDesk::open`](crate::desk::LendingDesk::open),
//! and afterwards hands every committed change to [`Repositories::save`]
//! from an effect.
//!
//! Effects run concurrently, so two change sets may reach storage out of
//! order. Each change set carries the revision of the state it was taken
//! from, and [`Repositories::save`] drops any entity snapshot older than the
//! one already written.

use crate::error::Entity;
use crate::inventory::Book;
use crate::rental::Rental;
use crate::standing::Member;
use crate::types::{BookId, MemberId, RentalId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// A storage provider failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The backend could not be reached or refused the operation
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Result type for storage providers
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Book provider
#[async_trait]
pub trait BookRepository: Send + Sync {
    /// Look up a book
    async fn find_by_id(&self, id: BookId) -> RepositoryResult<Option<Book>>;

    /// Look up a book by ISBN, ignoring case
    async fn find_by_isbn(&self, isbn: &str) -> RepositoryResult<Option<Book>>;

    /// Insert or replace a book
    async fn save(&self, book: Book) -> RepositoryResult<()>;

    /// Every book, in first-saved order
    async fn find_all(&self) -> RepositoryResult<Vec<Book>>;
}

/// Member provider
#[async_trait]
pub trait MemberRepository: Send + Sync {
    /// Look up a member
    async fn find_by_id(&self, id: MemberId) -> RepositoryResult<Option<Member>>;

    /// Look up a member by email, ignoring case
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<Member>>;

    /// Insert or replace a member
    async fn save(&self, member: Member) -> RepositoryResult<()>;

    /// Every member, in first-saved order
    async fn find_all(&self) -> RepositoryResult<Vec<Member>>;
}

/// Rental provider
#[async_trait]
pub trait RentalRepository: Send + Sync {
    /// Look up a rental
    async fn find_by_id(&self, id: RentalId) -> RepositoryResult<Option<Rental>>;

    /// All rentals of one member, open and closed
    async fn find_by_member_id(&self, member_id: MemberId) -> RepositoryResult<Vec<Rental>>;

    /// Insert or replace a rental
    async fn save(&self, rental: Rental) -> RepositoryResult<()>;

    /// Every rental, in first-saved order
    async fn find_all(&self) -> RepositoryResult<Vec<Rental>>;
}

/// Insertion-ordered map backing the in-memory providers
#[derive(Debug)]
struct Table<K, V> {
    rows: HashMap<K, V>,
    order: Vec<K>,
}

impl<K, V> Default for Table<K, V> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<K: Copy + Eq + Hash, V: Clone> Table<K, V> {
    fn get(&self, key: K) -> Option<V> {
        self.rows.get(&key).cloned()
    }

    fn upsert(&mut self, key: K, value: V) {
        if self.rows.insert(key, value).is_none() {
            self.order.push(key);
        }
    }

    fn values(&self) -> impl Iterator<Item = &V> {
        self.order.iter().filter_map(|key| self.rows.get(key))
    }
}

/// Books kept in process memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryBookRepository {
    table: Arc<RwLock<Table<BookId, Book>>>,
}

impl InMemoryBookRepository {
    /// Create an empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookRepository for InMemoryBookRepository {
    async fn find_by_id(&self, id: BookId) -> RepositoryResult<Option<Book>> {
        Ok(self.table.read().await.get(id))
    }

    async fn find_by_isbn(&self, isbn: &str) -> RepositoryResult<Option<Book>> {
        let table = self.table.read().await;
        Ok(table
            .values()
            .find(|book| book.isbn.eq_ignore_ascii_case(isbn.trim()))
            .cloned())
    }

    async fn save(&self, book: Book) -> RepositoryResult<()> {
        self.table.write().await.upsert(book.id, book);
        Ok(())
    }

    async fn find_all(&self) -> RepositoryResult<Vec<Book>> {
        Ok(self.table.read().await.values().cloned().collect())
    }
}

/// Members kept in process memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryMemberRepository {
    table: Arc<RwLock<Table<MemberId, Member>>>,
}

impl InMemoryMemberRepository {
    /// Create an empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemberRepository for InMemoryMemberRepository {
    async fn find_by_id(&self, id: MemberId) -> RepositoryResult<Option<Member>> {
        Ok(self.table.read().await.get(id))
    }

    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<Member>> {
        let table = self.table.read().await;
        Ok(table
            .values()
            .find(|member| member.email.eq_ignore_ascii_case(email.trim()))
            .cloned())
    }

    async fn save(&self, member: Member) -> RepositoryResult<()> {
        self.table.write().await.upsert(member.id, member);
        Ok(())
    }

    async fn find_all(&self) -> RepositoryResult<Vec<Member>> {
        Ok(self.table.read().await.values().cloned().collect())
    }
}

/// Rentals kept in process memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryRentalRepository {
    table: Arc<RwLock<Table<RentalId, Rental>>>,
}

impl InMemoryRentalRepository {
    /// Create an empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RentalRepository for InMemoryRentalRepository {
    async fn find_by_id(&self, id: RentalId) -> RepositoryResult<Option<Rental>> {
        Ok(self.table.read().await.get(id))
    }

    async fn find_by_member_id(&self, member_id: MemberId) -> RepositoryResult<Vec<Rental>> {
        let table = self.table.read().await;
        Ok(table
            .values()
            .filter(|rental| rental.member_id == member_id)
            .cloned()
            .collect())
    }

    async fn save(&self, rental: Rental) -> RepositoryResult<()> {
        self.table.write().await.upsert(rental.id, rental);
        Ok(())
    }

    async fn find_all(&self) -> RepositoryResult<Vec<Rental>> {
        Ok(self.table.read().await.values().cloned().collect())
    }
}

/// Entity snapshots produced by one committed command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Revision of the state the snapshots were taken from
    pub revision: u64,
    /// Changed books
    pub books: Vec<Book>,
    /// Changed members
    pub members: Vec<Member>,
    /// Changed rentals
    pub rentals: Vec<Rental>,
}

impl ChangeSet {
    /// Whether there is nothing to write
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.books.is_empty() && self.members.is_empty() && self.rentals.is_empty()
    }
}

/// Everything read back from storage at start-up
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Highest revision this process has written, so new writes supersede it
    pub revision: u64,
    /// All books
    pub books: Vec<Book>,
    /// All members
    pub members: Vec<Member>,
    /// All rentals
    pub rentals: Vec<Rental>,
}

/// The three providers the lending engine persists to
#[derive(Clone)]
pub struct Repositories {
    /// Book provider
    pub books: Arc<dyn BookRepository>,
    /// Member provider
    pub members: Arc<dyn MemberRepository>,
    /// Rental provider
    pub rentals: Arc<dyn RentalRepository>,
    /// Highest revision written per entity
    written: Arc<Mutex<HashMap<(Entity, Uuid), u64>>>,
}

impl Repositories {
    /// Bundle three providers
    #[must_use]
    pub fn new(
        books: Arc<dyn BookRepository>,
        members: Arc<dyn MemberRepository>,
        rentals: Arc<dyn RentalRepository>,
    ) -> Self {
        Self {
            books,
            members,
            rentals,
            written: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Fresh in-memory providers
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryBookRepository::new()),
            Arc::new(InMemoryMemberRepository::new()),
            Arc::new(InMemoryRentalRepository::new()),
        )
    }

    /// Read everything back
    ///
    /// # Errors
    ///
    /// Returns the first provider error.
    pub async fn load(&self) -> RepositoryResult<Snapshot> {
        let revision = self.written.lock().await.values().copied().max().unwrap_or(0);
        Ok(Snapshot {
            revision,
            books: self.books.find_all().await?,
            members: self.members.find_all().await?,
            rentals: self.rentals.find_all().await?,
        })
    }

    /// Write a change set, skipping snapshots older than what is stored
    ///
    /// Change sets are written one at a time.
    ///
    /// # Errors
    ///
    /// Returns the first provider error; snapshots before it stay written.
    pub async fn save(&self, changes: ChangeSet) -> RepositoryResult<()> {
        let mut written = self.written.lock().await;
        let revision = changes.revision;
        let mut fresh = |entity: Entity, id: Uuid| {
            let slot = written.entry((entity, id)).or_insert(0);
            if *slot > revision {
                return false;
            }
            *slot = revision;
            true
        };

        for book in changes.books {
            if fresh(Entity::Book, *book.id.as_uuid()) {
                self.books.save(book).await?;
            }
        }
        for member in changes.members {
            if fresh(Entity::Member, *member.id.as_uuid()) {
                self.members.save(member).await?;
            }
        }
        for rental in changes.rentals {
            if fresh(Entity::Rental, *rental.id.as_uuid()) {
                self.rentals.save(rental).await?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::rental::RentalStatus;
    use crate::types::{Credential, Role};
    use chrono::NaiveDate;

    fn book(n: u128, available: u32) -> Book {
        Book {
            id: BookId::from_uuid(Uuid::from_u128(n)),
            isbn: format!("ISBN-{n}"),
            title: "Title".to_string(),
            author: "Author".to_string(),
            total_copies: 3,
            available_copies: available,
        }
    }

    #[tokio::test]
    async fn test_book_repository_read_after_write() {
        let repo = InMemoryBookRepository::new();
        repo.save(book(1, 3)).await.unwrap();
        repo.save(book(2, 3)).await.unwrap();
        repo.save(book(1, 2)).await.unwrap();

        let found = repo.find_by_id(BookId::from_uuid(Uuid::from_u128(1))).await.unwrap();
        assert_eq!(found.map(|b| b.available_copies), Some(2));
        assert!(repo.find_by_isbn("isbn-2").await.unwrap().is_some());

        let all = repo.find_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, BookId::from_uuid(Uuid::from_u128(1)));
    }

    #[tokio::test]
    async fn test_member_repository_email_lookup_ignores_case() {
        let repo = InMemoryMemberRepository::new();
        repo.save(Member {
            id: MemberId::from_uuid(Uuid::from_u128(1)),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            credential: Credential::new("hash"),
            role: Role::User,
            suspend_until: None,
        })
        .await
        .unwrap();

        assert!(repo.find_by_email("ADA@example.COM").await.unwrap().is_some());
        assert!(repo.find_by_email("bob@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rental_repository_filters_by_member() {
        let repo = InMemoryRentalRepository::new();
        let day = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        for (n, member) in [(1, 7), (2, 8), (3, 7)] {
            repo.save(Rental {
                id: RentalId::from_uuid(Uuid::from_u128(n)),
                book_id: BookId::from_uuid(Uuid::from_u128(100)),
                member_id: MemberId::from_uuid(Uuid::from_u128(member)),
                rented_at: day,
                due_at: day,
                returned_at: None,
                status: RentalStatus::Rented,
                extension_count: 0,
                penalty_days: 0,
            })
            .await
            .unwrap();
        }

        let rentals = repo
            .find_by_member_id(MemberId::from_uuid(Uuid::from_u128(7)))
            .await
            .unwrap();
        assert_eq!(rentals.len(), 2);
    }

    #[tokio::test]
    async fn test_save_skips_stale_snapshots() {
        let repos = Repositories::in_memory();
        repos
            .save(ChangeSet {
                revision: 2,
                books: vec![book(1, 1)],
                ..ChangeSet::default()
            })
            .await
            .unwrap();
        repos
            .save(ChangeSet {
                revision: 1,
                books: vec![book(1, 2), book(2, 3)],
                ..ChangeSet::default()
            })
            .await
            .unwrap();

        let snapshot = repos.load().await.unwrap();
        assert_eq!(snapshot.books.len(), 2);
        assert_eq!(snapshot.books[0].available_copies, 1);
    }
}
