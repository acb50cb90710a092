use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, query_builder::QueryBuilder};

use super::{
    Duplicate, NewComment, NewReview, NewTaxon, NewTitle, NewUser, Page, PageRequest, RepoError,
    RepoResult, Repository, ReviewChanges, TaxonKind, TitleChanges, TitleFilter, UserChanges,
};
use crate::models::{Comment, Review, Taxon, Title, User};

const USER_COLUMNS: &str =
    "id, username, email, role, is_superuser, first_name, last_name, bio, confirmation_code";

// The rating sub-select is evaluated per row, so it always reflects the current reviews.
const TITLE_SELECT: &str = r#"
    SELECT
        t.id, t.name, t.year, t.description,
        c.id AS category_id, c.name AS category_name, c.slug AS category_slug,
        (SELECT ROUND(AVG(r.score))::INTEGER FROM reviews r WHERE r.title_id = t.id) AS rating
    FROM titles t
    LEFT JOIN categories c ON c.id = t.category_id
"#;

const REVIEW_SELECT: &str = r#"
    SELECT r.id, r.title_id, r.author_id, u.username AS author, r.text, r.score, r.pub_date
    FROM reviews r
    JOIN users u ON u.id = r.author_id
"#;

const COMMENT_SELECT: &str = r#"
    SELECT c.id, c.review_id, c.author_id, u.username AS author, c.text, c.pub_date
    FROM comments c
    JOIN users u ON u.id = c.author_id
"#;

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
/// Queries are built at runtime (`query_as` / `QueryBuilder`) with bound parameters only.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Flat row produced by `TITLE_SELECT`; genres are attached afterwards.
#[derive(FromRow)]
struct TitleRow {
    id: i64,
    name: String,
    year: i32,
    description: String,
    category_id: Option<i64>,
    category_name: Option<String>,
    category_slug: Option<String>,
    rating: Option<i32>,
}

impl TitleRow {
    fn into_title(self, genre: Vec<Taxon>) -> Title {
        let category = match (self.category_id, self.category_name, self.category_slug) {
            (Some(id), Some(name), Some(slug)) => Some(Taxon { id, name, slug }),
            _ => None,
        };
        Title {
            id: self.id,
            name: self.name,
            year: self.year,
            rating: self.rating,
            description: self.description,
            genre,
            category,
        }
    }
}

#[derive(FromRow)]
struct GenreLink {
    title_id: i64,
    id: i64,
    name: String,
    slug: String,
}

fn table(kind: TaxonKind) -> &'static str {
    match kind {
        TaxonKind::Category => "categories",
        TaxonKind::Genre => "genres",
    }
}

/// Translates unique-constraint violations into `Duplicate` variants.
fn map_write_error(err: sqlx::Error) -> RepoError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let duplicate = match db.constraint() {
                Some("users_username_key") => Some(Duplicate::Username),
                Some("users_email_key") => Some(Duplicate::Email),
                Some("categories_slug_key") | Some("genres_slug_key") => Some(Duplicate::Slug),
                Some("reviews_author_title_key") => Some(Duplicate::Review),
                _ => None,
            };
            if let Some(duplicate) = duplicate {
                return RepoError::Duplicate(duplicate);
            }
        }
    }
    RepoError::Database(err)
}

/// Escapes LIKE wildcards so user input is matched literally.
fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn push_page(builder: &mut QueryBuilder<'_, Postgres>, page: PageRequest) {
    builder
        .push(" LIMIT ")
        .push_bind(i64::from(page.page_size))
        .push(" OFFSET ")
        .push_bind(page.offset() as i64);
}

fn push_search(builder: &mut QueryBuilder<'_, Postgres>, column: &str, search: Option<&str>) {
    if let Some(search) = search.filter(|s| !s.is_empty()) {
        builder
            .push(" WHERE ")
            .push(column)
            .push(" ILIKE ")
            .push_bind(like_pattern(search));
    }
}

fn push_title_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &TitleFilter) {
    builder.push(" WHERE TRUE");
    if let Some(category) = &filter.category {
        builder.push(" AND c.slug = ").push_bind(category.clone());
    }
    if let Some(genre) = &filter.genre {
        builder
            .push(
                " AND EXISTS (SELECT 1 FROM genre_title gt JOIN genres g ON g.id = gt.genre_id \
                 WHERE gt.title_id = t.id AND g.slug = ",
            )
            .push_bind(genre.clone())
            .push(")");
    }
    if let Some(year) = filter.year {
        builder.push(" AND t.year = ").push_bind(year);
    }
    if let Some(name) = &filter.name {
        builder.push(" AND t.name ILIKE ").push_bind(like_pattern(name));
    }
}

/// Attaches genres to title rows with a single `ANY($1)` lookup.
async fn attach_genres(conn: &mut PgConnection, rows: Vec<TitleRow>) -> RepoResult<Vec<Title>> {
    let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
    let links: Vec<GenreLink> = if ids.is_empty() {
        Vec::new()
    } else {
        sqlx::query_as(
            r#"
            SELECT gt.title_id, g.id, g.name, g.slug
            FROM genre_title gt
            JOIN genres g ON g.id = gt.genre_id
            WHERE gt.title_id = ANY($1)
            ORDER BY g.slug
            "#,
        )
        .bind(ids.as_slice())
        .fetch_all(&mut *conn)
        .await?
    };

    let mut genres: HashMap<i64, Vec<Taxon>> = HashMap::new();
    for link in links {
        genres.entry(link.title_id).or_default().push(Taxon {
            id: link.id,
            name: link.name,
            slug: link.slug,
        });
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let genre = genres.remove(&row.id).unwrap_or_default();
            row.into_title(genre)
        })
        .collect())
}

async fn fetch_title(conn: &mut PgConnection, id: i64) -> RepoResult<Option<Title>> {
    let sql = format!("{TITLE_SELECT} WHERE t.id = $1");
    let row: Option<TitleRow> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(row) => Ok(attach_genres(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

async fn resolve_category(conn: &mut PgConnection, slug: &str) -> RepoResult<i64> {
    sqlx::query_scalar("SELECT id FROM categories WHERE slug = $1")
        .bind(slug)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| RepoError::UnknownReference {
            field: "category",
            value: slug.to_string(),
        })
}

async fn resolve_genres(conn: &mut PgConnection, slugs: &[String]) -> RepoResult<Vec<i64>> {
    let wanted: BTreeSet<&str> = slugs.iter().map(String::as_str).collect();
    if wanted.is_empty() {
        return Ok(Vec::new());
    }
    let found: Vec<(i64, String)> = sqlx::query_as("SELECT id, slug FROM genres WHERE slug = ANY($1)")
        .bind(slugs)
        .fetch_all(&mut *conn)
        .await?;

    if let Some(missing) = wanted
        .iter()
        .find(|slug| !found.iter().any(|(_, found_slug)| found_slug == *slug))
    {
        return Err(RepoError::UnknownReference {
            field: "genre",
            value: missing.to_string(),
        });
    }
    Ok(found.into_iter().map(|(id, _)| id).collect())
}

async fn link_genres(
    conn: &mut PgConnection,
    title_id: i64,
    genre_ids: Vec<i64>,
) -> RepoResult<()> {
    if genre_ids.is_empty() {
        return Ok(());
    }
    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO genre_title (title_id, genre_id) ");
    builder.push_values(genre_ids, |mut row, genre_id| {
        row.push_bind(title_id).push_bind(genre_id);
    });
    builder.build().execute(&mut *conn).await?;
    Ok(())
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- USERS ---

    async fn get_user(&self, id: i64) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn get_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        Ok(sqlx::query_as(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        Ok(sqlx::query_as(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// list_users
    ///
    /// Count and page queries share the same `WHERE` clause built by `push_search`.
    async fn list_users(&self, search: Option<&str>, page: PageRequest) -> RepoResult<Page<User>> {
        let mut count_query: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM users");
        push_search(&mut count_query, "username", search);
        let count: i64 = count_query.build_query_scalar().fetch_one(&self.pool).await?;

        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users"));
        push_search(&mut query, "username", search);
        query.push(" ORDER BY username");
        push_page(&mut query, page);
        let items = query.build_query_as::<User>().fetch_all(&self.pool).await?;

        Ok(Page {
            count: count as u64,
            items,
        })
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let sql = format!(
            "INSERT INTO users (username, email, role, is_superuser, first_name, last_name, bio, confirmation_code) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as(&sql)
            .bind(user.username)
            .bind(user.email)
            .bind(user.role.as_str())
            .bind(user.is_superuser)
            .bind(user.first_name)
            .bind(user.last_name)
            .bind(user.bio)
            .bind(user.confirmation_code)
            .fetch_one(&self.pool)
            .await
            .map_err(map_write_error)
    }

    /// update_user
    ///
    /// Uses `COALESCE` so only the provided fields are written.
    async fn update_user(&self, id: i64, changes: UserChanges) -> RepoResult<User> {
        let sql = format!(
            r#"
            UPDATE users
            SET username = COALESCE($2, username),
                email = COALESCE($3, email),
                role = COALESCE($4, role),
                first_name = COALESCE($5, first_name),
                last_name = COALESCE($6, last_name),
                bio = COALESCE($7, bio)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as(&sql)
            .bind(id)
            .bind(changes.username)
            .bind(changes.email)
            .bind(changes.role.map(|role| role.as_str()))
            .bind(changes.first_name)
            .bind(changes.last_name)
            .bind(changes.bio)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_write_error)?
            .ok_or(RepoError::NotFound("User"))
    }

    async fn delete_user(&self, id: i64) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_confirmation_code(&self, id: i64, code: Option<String>) -> RepoResult<()> {
        let result = sqlx::query("UPDATE users SET confirmation_code = $2 WHERE id = $1")
            .bind(id)
            .bind(code)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound("User"));
        }
        Ok(())
    }

    // --- CATEGORIES & GENRES ---

    async fn list_taxa(
        &self,
        kind: TaxonKind,
        search: Option<&str>,
        page: PageRequest,
    ) -> RepoResult<Page<Taxon>> {
        let mut count_query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", table(kind)));
        push_search(&mut count_query, "name", search);
        let count: i64 = count_query.build_query_scalar().fetch_one(&self.pool).await?;

        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT id, name, slug FROM {}", table(kind)));
        push_search(&mut query, "name", search);
        query.push(" ORDER BY name, id");
        push_page(&mut query, page);
        let items = query.build_query_as::<Taxon>().fetch_all(&self.pool).await?;

        Ok(Page {
            count: count as u64,
            items,
        })
    }

    async fn get_taxon(&self, kind: TaxonKind, slug: &str) -> RepoResult<Option<Taxon>> {
        let sql = format!("SELECT id, name, slug FROM {} WHERE slug = $1", table(kind));
        Ok(sqlx::query_as(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_taxon(&self, kind: TaxonKind, taxon: NewTaxon) -> RepoResult<Taxon> {
        let sql = format!(
            "INSERT INTO {} (name, slug) VALUES ($1, $2) RETURNING id, name, slug",
            table(kind)
        );
        sqlx::query_as(&sql)
            .bind(taxon.name)
            .bind(taxon.slug)
            .fetch_one(&self.pool)
            .await
            .map_err(map_write_error)
    }

    /// delete_taxon
    ///
    /// Titles keep existing: a deleted category is nulled out (`ON DELETE SET NULL`),
    /// a deleted genre drops its `genre_title` links.
    async fn delete_taxon(&self, kind: TaxonKind, slug: &str) -> RepoResult<bool> {
        let sql = format!("DELETE FROM {} WHERE slug = $1", table(kind));
        let result = sqlx::query(&sql).bind(slug).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    // --- TITLES ---

    async fn list_titles(&self, filter: &TitleFilter, page: PageRequest) -> RepoResult<Page<Title>> {
        let mut conn = self.pool.acquire().await?;

        let mut count_query: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT COUNT(*) FROM titles t LEFT JOIN categories c ON c.id = t.category_id",
        );
        push_title_filters(&mut count_query, filter);
        let count: i64 = count_query.build_query_scalar().fetch_one(&mut *conn).await?;

        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(TITLE_SELECT);
        push_title_filters(&mut query, filter);
        query.push(" ORDER BY t.id");
        push_page(&mut query, page);
        let rows = query.build_query_as::<TitleRow>().fetch_all(&mut *conn).await?;

        let items = attach_genres(&mut conn, rows).await?;
        Ok(Page {
            count: count as u64,
            items,
        })
    }

    async fn get_title(&self, id: i64) -> RepoResult<Option<Title>> {
        let mut conn = self.pool.acquire().await?;
        fetch_title(&mut conn, id).await
    }

    /// create_title
    ///
    /// Slug resolution, the title row and its genre links are written in one
    /// transaction: an unknown slug leaves nothing behind.
    async fn create_title(&self, title: NewTitle) -> RepoResult<Title> {
        let mut tx = self.pool.begin().await?;

        let category_id = match &title.category {
            Some(slug) => Some(resolve_category(&mut tx, slug).await?),
            None => None,
        };
        let genre_ids = resolve_genres(&mut tx, &title.genre).await?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO titles (name, year, description, category_id) VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(title.name)
        .bind(title.year)
        .bind(title.description)
        .bind(category_id)
        .fetch_one(&mut *tx)
        .await?;

        link_genres(&mut tx, id, genre_ids).await?;
        let created = fetch_title(&mut tx, id)
            .await?
            .ok_or(RepoError::NotFound("Title"))?;

        tx.commit().await?;
        Ok(created)
    }

    async fn update_title(&self, id: i64, changes: TitleChanges) -> RepoResult<Title> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<i64> = sqlx::query_scalar("SELECT id FROM titles WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(RepoError::NotFound("Title"));
        }

        let category_id = match &changes.category {
            Some(Some(slug)) => Some(Some(resolve_category(&mut tx, slug).await?)),
            Some(None) => Some(None),
            None => None,
        };

        sqlx::query(
            r#"
            UPDATE titles
            SET name = COALESCE($2, name),
                year = COALESCE($3, year),
                description = COALESCE($4, description),
                category_id = CASE WHEN $5 THEN $6 ELSE category_id END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(changes.name)
        .bind(changes.year)
        .bind(changes.description)
        .bind(category_id.is_some())
        .bind(category_id.flatten())
        .execute(&mut *tx)
        .await?;

        if let Some(genre) = changes.genre {
            let genre_ids = resolve_genres(&mut tx, &genre).await?;
            sqlx::query("DELETE FROM genre_title WHERE title_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            link_genres(&mut tx, id, genre_ids).await?;
        }

        let updated = fetch_title(&mut tx, id)
            .await?
            .ok_or(RepoError::NotFound("Title"))?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_title(&self, id: i64) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM titles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- REVIEWS ---

    async fn list_reviews(&self, title_id: i64, page: PageRequest) -> RepoResult<Page<Review>> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE title_id = $1")
            .bind(title_id)
            .fetch_one(&self.pool)
            .await?;

        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(REVIEW_SELECT);
        query.push(" WHERE r.title_id = ").push_bind(title_id);
        query.push(" ORDER BY r.id");
        push_page(&mut query, page);
        let items = query.build_query_as::<Review>().fetch_all(&self.pool).await?;

        Ok(Page {
            count: count as u64,
            items,
        })
    }

    async fn get_review(&self, title_id: i64, id: i64) -> RepoResult<Option<Review>> {
        let sql = format!("{REVIEW_SELECT} WHERE r.title_id = $1 AND r.id = $2");
        Ok(sqlx::query_as(&sql)
            .bind(title_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// create_review
    ///
    /// Insert and author join in one statement. The `(author_id, title_id)` unique
    /// constraint turns a second review into `Duplicate::Review`.
    async fn create_review(&self, review: NewReview) -> RepoResult<Review> {
        sqlx::query_as(
            r#"
            WITH inserted AS (
                INSERT INTO reviews (title_id, author_id, text, score)
                VALUES ($1, $2, $3, $4)
                RETURNING id, title_id, author_id, text, score, pub_date
            )
            SELECT i.id, i.title_id, i.author_id, u.username AS author, i.text, i.score, i.pub_date
            FROM inserted i JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(review.title_id)
        .bind(review.author_id)
        .bind(review.text)
        .bind(review.score)
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)
    }

    async fn update_review(&self, id: i64, changes: ReviewChanges) -> RepoResult<Review> {
        sqlx::query_as(
            r#"
            WITH updated AS (
                UPDATE reviews
                SET text = COALESCE($2, text),
                    score = COALESCE($3, score)
                WHERE id = $1
                RETURNING id, title_id, author_id, text, score, pub_date
            )
            SELECT d.id, d.title_id, d.author_id, u.username AS author, d.text, d.score, d.pub_date
            FROM updated d JOIN users u ON u.id = d.author_id
            "#,
        )
        .bind(id)
        .bind(changes.text)
        .bind(changes.score)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepoError::NotFound("Review"))
    }

    async fn delete_review(&self, id: i64) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- COMMENTS ---

    async fn list_comments(&self, review_id: i64, page: PageRequest) -> RepoResult<Page<Comment>> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE review_id = $1")
            .bind(review_id)
            .fetch_one(&self.pool)
            .await?;

        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(COMMENT_SELECT);
        query.push(" WHERE c.review_id = ").push_bind(review_id);
        query.push(" ORDER BY c.id");
        push_page(&mut query, page);
        let items = query.build_query_as::<Comment>().fetch_all(&self.pool).await?;

        Ok(Page {
            count: count as u64,
            items,
        })
    }

    async fn get_comment(&self, review_id: i64, id: i64) -> RepoResult<Option<Comment>> {
        let sql = format!("{COMMENT_SELECT} WHERE c.review_id = $1 AND c.id = $2");
        Ok(sqlx::query_as(&sql)
            .bind(review_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_comment(&self, comment: NewComment) -> RepoResult<Comment> {
        Ok(sqlx::query_as(
            r#"
            WITH inserted AS (
                INSERT INTO comments (review_id, author_id, text)
                VALUES ($1, $2, $3)
                RETURNING id, review_id, author_id, text, pub_date
            )
            SELECT i.id, i.review_id, i.author_id, u.username AS author, i.text, i.pub_date
            FROM inserted i JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(comment.review_id)
        .bind(comment.author_id)
        .bind(comment.text)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn update_comment(&self, id: i64, text: String) -> RepoResult<Comment> {
        sqlx::query_as(
            r#"
            WITH updated AS (
                UPDATE comments SET text = $2 WHERE id = $1
                RETURNING id, review_id, author_id, text, pub_date
            )
            SELECT d.id, d.review_id, d.author_id, u.username AS author, d.text, d.pub_date
            FROM updated d JOIN users u ON u.id = d.author_id
            "#,
        )
        .bind(id)
        .bind(text)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepoError::NotFound("Comment"))
    }

    async fn delete_comment(&self, id: i64) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
