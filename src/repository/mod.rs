use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Comment, Review, Role, Taxon, Title, User};

mod memory;
mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

pub type RepoResult<T> = Result<T, RepoError>;

/// RepoError
///
/// Persistence failures surfaced to the handlers. Constraint violations are
/// translated into domain variants so callers never inspect SQL state codes.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Duplicate(#[from] Duplicate),

    #[error("unknown {field}: {value}")]
    UnknownReference { field: &'static str, value: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Duplicate
///
/// Which uniqueness rule a write violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Duplicate {
    #[error("A user with that username already exists.")]
    Username,
    #[error("A user with that email already exists.")]
    Email,
    #[error("An object with this slug already exists.")]
    Slug,
    #[error("You have already reviewed this title.")]
    Review,
}

/// TaxonKind
///
/// Selects between the two slug-addressed catalog tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxonKind {
    Category,
    Genre,
}

impl TaxonKind {
    pub fn label(&self) -> &'static str {
        match self {
            TaxonKind::Category => "Category",
            TaxonKind::Genre => "Genre",
        }
    }
}

/// PageRequest
///
/// A 1-based page number and a page size, already clamped by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }
}

/// Page
///
/// One slice of a listing plus the total number of matching rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub count: u64,
    pub items: Vec<T>,
}

/// TitleFilter
///
/// Listing filters for `/titles/`. `category` and `genre` match slugs exactly,
/// `name` is a case-insensitive substring match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TitleFilter {
    pub category: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub name: Option<String>,
}

// --- Write inputs (already validated) ---

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub role: Role,
    pub is_superuser: bool,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub confirmation_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTaxon {
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTitle {
    pub name: String,
    pub year: i32,
    pub description: String,
    pub genre: Vec<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TitleChanges {
    pub name: Option<String>,
    pub year: Option<i32>,
    pub description: Option<String>,
    pub genre: Option<Vec<String>>,
    pub category: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewReview {
    pub title_id: i64,
    pub author_id: i64,
    pub text: String,
    pub score: i32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewChanges {
    pub text: Option<String>,
    pub score: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewComment {
    pub review_id: i64,
    pub author_id: i64,
    pub text: String,
}

/// Repository Trait
///
/// The abstract contract for all persistence operations. Handlers only see this
/// trait, so the PostgreSQL implementation and the in-memory one are interchangeable.
///
/// Every method returns immutable value structs; multi-row writes are atomic.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: i64) -> RepoResult<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> RepoResult<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    // Search is a case-insensitive substring match on username.
    async fn list_users(&self, search: Option<&str>, page: PageRequest) -> RepoResult<Page<User>>;
    async fn create_user(&self, user: NewUser) -> RepoResult<User>;
    async fn update_user(&self, id: i64, changes: UserChanges) -> RepoResult<User>;
    async fn delete_user(&self, id: i64) -> RepoResult<bool>;
    // `None` clears the code (after a successful token exchange).
    async fn set_confirmation_code(&self, id: i64, code: Option<String>) -> RepoResult<()>;

    // --- Categories & genres ---
    async fn list_taxa(
        &self,
        kind: TaxonKind,
        search: Option<&str>,
        page: PageRequest,
    ) -> RepoResult<Page<Taxon>>;
    async fn get_taxon(&self, kind: TaxonKind, slug: &str) -> RepoResult<Option<Taxon>>;
    async fn create_taxon(&self, kind: TaxonKind, taxon: NewTaxon) -> RepoResult<Taxon>;
    async fn delete_taxon(&self, kind: TaxonKind, slug: &str) -> RepoResult<bool>;

    // --- Titles ---
    async fn list_titles(&self, filter: &TitleFilter, page: PageRequest) -> RepoResult<Page<Title>>;
    async fn get_title(&self, id: i64) -> RepoResult<Option<Title>>;
    async fn create_title(&self, title: NewTitle) -> RepoResult<Title>;
    async fn update_title(&self, id: i64, changes: TitleChanges) -> RepoResult<Title>;
    // Cascades to the title's reviews and their comments.
    async fn delete_title(&self, id: i64) -> RepoResult<bool>;

    // --- Reviews ---
    async fn list_reviews(&self, title_id: i64, page: PageRequest) -> RepoResult<Page<Review>>;
    async fn get_review(&self, title_id: i64, id: i64) -> RepoResult<Option<Review>>;
    async fn create_review(&self, review: NewReview) -> RepoResult<Review>;
    async fn update_review(&self, id: i64, changes: ReviewChanges) -> RepoResult<Review>;
    async fn delete_review(&self, id: i64) -> RepoResult<bool>;

    // --- Comments ---
    async fn list_comments(&self, review_id: i64, page: PageRequest) -> RepoResult<Page<Comment>>;
    async fn get_comment(&self, review_id: i64, id: i64) -> RepoResult<Option<Comment>>;
    async fn create_comment(&self, comment: NewComment) -> RepoResult<Comment>;
    async fn update_comment(&self, id: i64, text: String) -> RepoResult<Comment>;
    async fn delete_comment(&self, id: i64) -> RepoResult<bool>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// Rounds a mean score half away from zero, matching PostgreSQL's `ROUND(numeric)`.
pub fn rounded_mean(scores: &[i32]) -> Option<i32> {
    if scores.is_empty() {
        return None;
    }
    let sum: i64 = scores.iter().map(|&s| i64::from(s)).sum();
    let mean = sum as f64 / scores.len() as f64;
    Some(mean.round() as i32)
}
