use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    Duplicate, NewComment, NewReview, NewTaxon, NewTitle, NewUser, Page, PageRequest, RepoError,
    RepoResult, Repository, ReviewChanges, TaxonKind, TitleChanges, TitleFilter, UserChanges,
    rounded_mean,
};
use crate::models::{Comment, Review, Taxon, Title, User};

#[derive(Clone)]
struct TitleRecord {
    id: i64,
    name: String,
    year: i32,
    description: String,
    genre_ids: Vec<i64>,
    category_id: Option<i64>,
}

// Reviews and comments keep only the author id; the username is joined on read.
#[derive(Clone)]
struct ReviewRecord {
    id: i64,
    title_id: i64,
    author_id: i64,
    text: String,
    score: i32,
    pub_date: DateTime<Utc>,
}

#[derive(Clone)]
struct CommentRecord {
    id: i64,
    review_id: i64,
    author_id: i64,
    text: String,
    pub_date: DateTime<Utc>,
}

#[derive(Default)]
struct Store {
    next_id: i64,
    users: Vec<User>,
    categories: Vec<Taxon>,
    genres: Vec<Taxon>,
    titles: Vec<TitleRecord>,
    reviews: Vec<ReviewRecord>,
    comments: Vec<CommentRecord>,
}

impl Store {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn taxa(&self, kind: TaxonKind) -> &Vec<Taxon> {
        match kind {
            TaxonKind::Category => &self.categories,
            TaxonKind::Genre => &self.genres,
        }
    }

    fn taxa_mut(&mut self, kind: TaxonKind) -> &mut Vec<Taxon> {
        match kind {
            TaxonKind::Category => &mut self.categories,
            TaxonKind::Genre => &mut self.genres,
        }
    }

    fn username(&self, id: i64) -> Option<&str> {
        self.users
            .iter()
            .find(|u| u.id == id)
            .map(|u| u.username.as_str())
    }

    /// `None` for a row whose author is gone, matching the inner join in SQL.
    fn review(&self, record: &ReviewRecord) -> Option<Review> {
        Some(Review {
            id: record.id,
            title_id: record.title_id,
            author_id: record.author_id,
            author: self.username(record.author_id)?.to_string(),
            text: record.text.clone(),
            score: record.score,
            pub_date: record.pub_date,
        })
    }

    fn comment(&self, record: &CommentRecord) -> Option<Comment> {
        Some(Comment {
            id: record.id,
            review_id: record.review_id,
            author_id: record.author_id,
            author: self.username(record.author_id)?.to_string(),
            text: record.text.clone(),
            pub_date: record.pub_date,
        })
    }

    fn resolve_category(&self, slug: &str) -> RepoResult<i64> {
        self.categories
            .iter()
            .find(|c| c.slug == slug)
            .map(|c| c.id)
            .ok_or_else(|| RepoError::UnknownReference {
                field: "category",
                value: slug.to_string(),
            })
    }

    fn resolve_genres(&self, slugs: &[String]) -> RepoResult<Vec<i64>> {
        let mut ids: Vec<i64> = Vec::new();
        for slug in slugs {
            let id = self
                .genres
                .iter()
                .find(|g| &g.slug == slug)
                .map(|g| g.id)
                .ok_or_else(|| RepoError::UnknownReference {
                    field: "genre",
                    value: slug.clone(),
                })?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn check_user_unique(&self, id: Option<i64>, username: &str, email: &str) -> RepoResult<()> {
        let others = self.users.iter().filter(|u| Some(u.id) != id);
        for user in others {
            if user.username == username {
                return Err(Duplicate::Username.into());
            }
            if user.email == email {
                return Err(Duplicate::Email.into());
            }
        }
        Ok(())
    }

    fn materialize(&self, record: &TitleRecord) -> Title {
        let scores: Vec<i32> = self
            .reviews
            .iter()
            .filter(|r| r.title_id == record.id)
            .map(|r| r.score)
            .collect();
        let mut genre: Vec<Taxon> = self
            .genres
            .iter()
            .filter(|g| record.genre_ids.contains(&g.id))
            .cloned()
            .collect();
        genre.sort_by(|a, b| a.slug.cmp(&b.slug));

        Title {
            id: record.id,
            name: record.name.clone(),
            year: record.year,
            rating: rounded_mean(&scores),
            description: record.description.clone(),
            genre,
            category: record
                .category_id
                .and_then(|id| self.categories.iter().find(|c| c.id == id).cloned()),
        }
    }

    fn title_matches(&self, record: &TitleRecord, filter: &TitleFilter) -> bool {
        if let Some(slug) = &filter.category {
            let category = record
                .category_id
                .and_then(|id| self.categories.iter().find(|c| c.id == id));
            if category.map(|c| &c.slug) != Some(slug) {
                return false;
            }
        }
        if let Some(slug) = &filter.genre {
            let has_genre = self
                .genres
                .iter()
                .any(|g| &g.slug == slug && record.genre_ids.contains(&g.id));
            if !has_genre {
                return false;
            }
        }
        if filter.year.is_some_and(|year| year != record.year) {
            return false;
        }
        if let Some(name) = &filter.name {
            if !contains_ignore_case(&record.name, name) {
                return false;
            }
        }
        true
    }

    fn remove_reviews(&mut self, predicate: impl Fn(&ReviewRecord) -> bool) {
        let removed: Vec<i64> = self
            .reviews
            .iter()
            .filter(|r| predicate(r))
            .map(|r| r.id)
            .collect();
        self.reviews.retain(|r| !removed.contains(&r.id));
        self.comments.retain(|c| !removed.contains(&c.review_id));
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn paginate<T: Clone>(items: Vec<T>, page: PageRequest) -> Page<T> {
    let count = items.len() as u64;
    let items = items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.page_size as usize)
        .collect();
    Page { count, items }
}

/// InMemoryRepository
///
/// A process-local implementation of `Repository` with the same constraints as the
/// SQL schema (uniqueness, cascades, `SET NULL` on category deletion). Backs the
/// test suites and `STORAGE=memory` runs.
///
/// Every method holds the lock for its whole body, so each call is atomic.
#[derive(Default)]
pub struct InMemoryRepository {
    store: Mutex<Store>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, id: i64) -> RepoResult<Option<User>> {
        Ok(self.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        Ok(self.lock().users.iter().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self, search: Option<&str>, page: PageRequest) -> RepoResult<Page<User>> {
        let store = self.lock();
        let mut users: Vec<User> = store
            .users
            .iter()
            .filter(|u| search.is_none_or(|s| contains_ignore_case(&u.username, s)))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(paginate(users, page))
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let mut store = self.lock();
        store.check_user_unique(None, &user.username, &user.email)?;
        let created = User {
            id: store.next_id(),
            username: user.username,
            email: user.email,
            role: user.role,
            is_superuser: user.is_superuser,
            first_name: user.first_name,
            last_name: user.last_name,
            bio: user.bio,
            confirmation_code: user.confirmation_code,
        };
        store.users.push(created.clone());
        Ok(created)
    }

    async fn update_user(&self, id: i64, changes: UserChanges) -> RepoResult<User> {
        let mut store = self.lock();
        let current = store
            .users
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .ok_or(RepoError::NotFound("User"))?;

        let mut updated = current;
        if let Some(username) = changes.username {
            updated.username = username;
        }
        if let Some(email) = changes.email {
            updated.email = email;
        }
        if let Some(role) = changes.role {
            updated.role = role;
        }
        if let Some(first_name) = changes.first_name {
            updated.first_name = first_name;
        }
        if let Some(last_name) = changes.last_name {
            updated.last_name = last_name;
        }
        if let Some(bio) = changes.bio {
            updated.bio = bio;
        }
        store.check_user_unique(Some(id), &updated.username, &updated.email)?;

        if let Some(slot) = store.users.iter_mut().find(|u| u.id == id) {
            *slot = updated.clone();
        }
        Ok(updated)
    }

    async fn delete_user(&self, id: i64) -> RepoResult<bool> {
        let mut store = self.lock();
        let before = store.users.len();
        store.users.retain(|u| u.id != id);
        if store.users.len() == before {
            return Ok(false);
        }
        store.remove_reviews(|r| r.author_id == id);
        store.comments.retain(|c| c.author_id != id);
        Ok(true)
    }

    async fn set_confirmation_code(&self, id: i64, code: Option<String>) -> RepoResult<()> {
        let mut store = self.lock();
        let user = store
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(RepoError::NotFound("User"))?;
        user.confirmation_code = code;
        Ok(())
    }

    async fn list_taxa(
        &self,
        kind: TaxonKind,
        search: Option<&str>,
        page: PageRequest,
    ) -> RepoResult<Page<Taxon>> {
        let store = self.lock();
        let mut taxa: Vec<Taxon> = store
            .taxa(kind)
            .iter()
            .filter(|t| search.is_none_or(|s| contains_ignore_case(&t.name, s)))
            .cloned()
            .collect();
        taxa.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(paginate(taxa, page))
    }

    async fn get_taxon(&self, kind: TaxonKind, slug: &str) -> RepoResult<Option<Taxon>> {
        Ok(self
            .lock()
            .taxa(kind)
            .iter()
            .find(|t| t.slug == slug)
            .cloned())
    }

    async fn create_taxon(&self, kind: TaxonKind, taxon: NewTaxon) -> RepoResult<Taxon> {
        let mut store = self.lock();
        if store.taxa(kind).iter().any(|t| t.slug == taxon.slug) {
            return Err(Duplicate::Slug.into());
        }
        let created = Taxon {
            id: store.next_id(),
            name: taxon.name,
            slug: taxon.slug,
        };
        store.taxa_mut(kind).push(created.clone());
        Ok(created)
    }

    async fn delete_taxon(&self, kind: TaxonKind, slug: &str) -> RepoResult<bool> {
        let mut store = self.lock();
        let Some(id) = store.taxa(kind).iter().find(|t| t.slug == slug).map(|t| t.id) else {
            return Ok(false);
        };
        store.taxa_mut(kind).retain(|t| t.id != id);
        for title in store.titles.iter_mut() {
            match kind {
                TaxonKind::Category if title.category_id == Some(id) => title.category_id = None,
                TaxonKind::Genre => title.genre_ids.retain(|g| *g != id),
                TaxonKind::Category => {}
            }
        }
        Ok(true)
    }

    async fn list_titles(&self, filter: &TitleFilter, page: PageRequest) -> RepoResult<Page<Title>> {
        let store = self.lock();
        let titles: Vec<Title> = store
            .titles
            .iter()
            .filter(|record| store.title_matches(record, filter))
            .map(|record| store.materialize(record))
            .collect();
        Ok(paginate(titles, page))
    }

    async fn get_title(&self, id: i64) -> RepoResult<Option<Title>> {
        let store = self.lock();
        Ok(store
            .titles
            .iter()
            .find(|t| t.id == id)
            .map(|record| store.materialize(record)))
    }

    async fn create_title(&self, title: NewTitle) -> RepoResult<Title> {
        let mut store = self.lock();
        let category_id = match &title.category {
            Some(slug) => Some(store.resolve_category(slug)?),
            None => None,
        };
        let genre_ids = store.resolve_genres(&title.genre)?;
        let record = TitleRecord {
            id: store.next_id(),
            name: title.name,
            year: title.year,
            description: title.description,
            genre_ids,
            category_id,
        };
        let created = store.materialize(&record);
        store.titles.push(record);
        Ok(created)
    }

    async fn update_title(&self, id: i64, changes: TitleChanges) -> RepoResult<Title> {
        let mut store = self.lock();
        let mut record = store
            .titles
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or(RepoError::NotFound("Title"))?;

        // Resolve every reference before touching the record.
        let category_id = match &changes.category {
            Some(Some(slug)) => Some(Some(store.resolve_category(slug)?)),
            Some(None) => Some(None),
            None => None,
        };
        let genre_ids = match &changes.genre {
            Some(slugs) => Some(store.resolve_genres(slugs)?),
            None => None,
        };

        if let Some(name) = changes.name {
            record.name = name;
        }
        if let Some(year) = changes.year {
            record.year = year;
        }
        if let Some(description) = changes.description {
            record.description = description;
        }
        if let Some(category_id) = category_id {
            record.category_id = category_id;
        }
        if let Some(genre_ids) = genre_ids {
            record.genre_ids = genre_ids;
        }

        let updated = store.materialize(&record);
        if let Some(slot) = store.titles.iter_mut().find(|t| t.id == id) {
            *slot = record;
        }
        Ok(updated)
    }

    async fn delete_title(&self, id: i64) -> RepoResult<bool> {
        let mut store = self.lock();
        let before = store.titles.len();
        store.titles.retain(|t| t.id != id);
        if store.titles.len() == before {
            return Ok(false);
        }
        store.remove_reviews(|r| r.title_id == id);
        Ok(true)
    }

    async fn list_reviews(&self, title_id: i64, page: PageRequest) -> RepoResult<Page<Review>> {
        let store = self.lock();
        let reviews: Vec<Review> = store
            .reviews
            .iter()
            .filter(|r| r.title_id == title_id)
            .filter_map(|r| store.review(r))
            .collect();
        Ok(paginate(reviews, page))
    }

    async fn get_review(&self, title_id: i64, id: i64) -> RepoResult<Option<Review>> {
        let store = self.lock();
        Ok(store
            .reviews
            .iter()
            .find(|r| r.title_id == title_id && r.id == id)
            .and_then(|r| store.review(r)))
    }

    async fn create_review(&self, review: NewReview) -> RepoResult<Review> {
        let mut store = self.lock();
        if !store.titles.iter().any(|t| t.id == review.title_id) {
            return Err(RepoError::NotFound("Title"));
        }
        if store
            .reviews
            .iter()
            .any(|r| r.title_id == review.title_id && r.author_id == review.author_id)
        {
            return Err(Duplicate::Review.into());
        }
        if store.username(review.author_id).is_none() {
            return Err(RepoError::NotFound("User"));
        }
        let record = ReviewRecord {
            id: store.next_id(),
            title_id: review.title_id,
            author_id: review.author_id,
            text: review.text,
            score: review.score,
            pub_date: Utc::now(),
        };
        store.reviews.push(record.clone());
        store.review(&record).ok_or(RepoError::NotFound("User"))
    }

    async fn update_review(&self, id: i64, changes: ReviewChanges) -> RepoResult<Review> {
        let mut store = self.lock();
        let record = store
            .reviews
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(RepoError::NotFound("Review"))?;
        if let Some(text) = changes.text {
            record.text = text;
        }
        if let Some(score) = changes.score {
            record.score = score;
        }
        let record = record.clone();
        store.review(&record).ok_or(RepoError::NotFound("Review"))
    }

    async fn delete_review(&self, id: i64) -> RepoResult<bool> {
        let mut store = self.lock();
        let existed = store.reviews.iter().any(|r| r.id == id);
        store.remove_reviews(|r| r.id == id);
        Ok(existed)
    }

    async fn list_comments(&self, review_id: i64, page: PageRequest) -> RepoResult<Page<Comment>> {
        let store = self.lock();
        let comments: Vec<Comment> = store
            .comments
            .iter()
            .filter(|c| c.review_id == review_id)
            .filter_map(|c| store.comment(c))
            .collect();
        Ok(paginate(comments, page))
    }

    async fn get_comment(&self, review_id: i64, id: i64) -> RepoResult<Option<Comment>> {
        let store = self.lock();
        Ok(store
            .comments
            .iter()
            .find(|c| c.review_id == review_id && c.id == id)
            .and_then(|c| store.comment(c)))
    }

    async fn create_comment(&self, comment: NewComment) -> RepoResult<Comment> {
        let mut store = self.lock();
        if !store.reviews.iter().any(|r| r.id == comment.review_id) {
            return Err(RepoError::NotFound("Review"));
        }
        if store.username(comment.author_id).is_none() {
            return Err(RepoError::NotFound("User"));
        }
        let record = CommentRecord {
            id: store.next_id(),
            review_id: comment.review_id,
            author_id: comment.author_id,
            text: comment.text,
            pub_date: Utc::now(),
        };
        store.comments.push(record.clone());
        store.comment(&record).ok_or(RepoError::NotFound("User"))
    }

    async fn update_comment(&self, id: i64, text: String) -> RepoResult<Comment> {
        let mut store = self.lock();
        let record = store
            .comments
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(RepoError::NotFound("Comment"))?;
        record.text = text;
        let record = record.clone();
        store.comment(&record).ok_or(RepoError::NotFound("Comment"))
    }

    async fn delete_comment(&self, id: i64) -> RepoResult<bool> {
        let mut store = self.lock();
        let before = store.comments.len();
        store.comments.retain(|c| c.id != id);
        Ok(store.comments.len() != before)
    }
}
