use chrono::{Datelike, Utc};

use crate::{
    error::{ApiError, ApiResult, FieldErrors},
    models::{
        CommentRequest, CreateReviewRequest, CreateTaxonRequest, CreateTitleRequest,
        CreateUserRequest, SignupRequest, TokenRequest, UpdateReviewRequest,
        UpdateTitleRequest, UpdateUserRequest,
    },
    repository::{NewTaxon, NewTitle, NewUser, ReviewChanges, TitleChanges, UserChanges},
};

pub const USERNAME_MAX_LEN: usize = 150;
pub const EMAIL_MAX_LEN: usize = 254;
pub const PERSON_NAME_MAX_LEN: usize = 150;
pub const NAME_MAX_LEN: usize = 256;
pub const SLUG_MAX_LEN: usize = 50;
pub const SCORE_MIN: i64 = 1;
pub const SCORE_MAX: i64 = 10;

/// Reserved because `/users/me/` would shadow the account.
pub const RESERVED_USERNAME: &str = "me";

const REQUIRED: &str = "This field is required.";
const BLANK: &str = "This field may not be blank.";

fn too_long(max: usize) -> String {
    format!("Ensure this field has no more than {max} characters.")
}

fn is_username_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '@' | '+' | '-')
}

fn is_slug_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_')
}

/// Returns the value when present, recording `required` otherwise.
fn require<T>(errors: &mut FieldErrors, field: &str, value: Option<T>) -> Option<T> {
    if value.is_none() {
        errors.add(field, REQUIRED);
    }
    value
}

fn check_max_len(errors: &mut FieldErrors, field: &str, value: &str, max: usize) {
    if value.chars().count() > max {
        errors.add(field, too_long(max));
    }
}

/// Non-blank, bounded free text such as a name.
fn check_text(errors: &mut FieldErrors, field: &str, value: &str, max: Option<usize>) {
    if value.trim().is_empty() {
        errors.add(field, BLANK);
        return;
    }
    if let Some(max) = max {
        check_max_len(errors, field, value, max);
    }
}

pub fn check_username(errors: &mut FieldErrors, value: &str) {
    const FIELD: &str = "username";
    if value.is_empty() {
        errors.add(FIELD, BLANK);
        return;
    }
    check_max_len(errors, FIELD, value, USERNAME_MAX_LEN);
    if !value.chars().all(is_username_char) {
        errors.add(
            FIELD,
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        );
    }
    if value == RESERVED_USERNAME {
        errors.add(FIELD, "Username 'me' is not allowed.");
    }
}

pub fn check_email(errors: &mut FieldErrors, value: &str) {
    const FIELD: &str = "email";
    if value.is_empty() {
        errors.add(FIELD, BLANK);
        return;
    }
    check_max_len(errors, FIELD, value, EMAIL_MAX_LEN);

    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        errors.add(FIELD, "Enter a valid email address.");
    }
}

pub fn check_slug(errors: &mut FieldErrors, value: &str) {
    const FIELD: &str = "slug";
    if value.is_empty() {
        errors.add(FIELD, BLANK);
        return;
    }
    check_max_len(errors, FIELD, value, SLUG_MAX_LEN);
    if !value.chars().all(is_slug_char) {
        errors.add(
            FIELD,
            "Enter a valid slug consisting of letters, numbers, underscores or hyphens.",
        );
    }
}

pub fn check_year(errors: &mut FieldErrors, year: i32) {
    let current = Utc::now().year();
    if year > current {
        errors.add("year", format!("Year cannot be later than {current}."));
    }
}

/// Range-checks a score and narrows it to the stored width.
pub fn check_score(errors: &mut FieldErrors, score: i64) -> Option<i32> {
    if (SCORE_MIN..=SCORE_MAX).contains(&score) {
        i32::try_from(score).ok()
    } else {
        errors.add(
            "score",
            format!("Ensure this value is between {SCORE_MIN} and {SCORE_MAX}."),
        );
        None
    }
}

fn check_person_names(
    errors: &mut FieldErrors,
    first_name: Option<&str>,
    last_name: Option<&str>,
) {
    if let Some(first_name) = first_name {
        check_max_len(errors, "first_name", first_name, PERSON_NAME_MAX_LEN);
    }
    if let Some(last_name) = last_name {
        check_max_len(errors, "last_name", last_name, PERSON_NAME_MAX_LEN);
    }
}

// --- Payload conversions ---

/// Validates a signup payload into its `(username, email)` pair.
pub fn signup(payload: SignupRequest) -> ApiResult<(String, String)> {
    let mut errors = FieldErrors::new();
    let username = require(&mut errors, "username", payload.username);
    let email = require(&mut errors, "email", payload.email);
    if let Some(username) = &username {
        check_username(&mut errors, username);
    }
    if let Some(email) = &email {
        check_email(&mut errors, email);
    }
    let (Some(username), Some(email), true) = (username, email, errors.is_empty()) else {
        return Err(ApiError::Validation(errors));
    };
    Ok((username, email))
}

/// Validates a token request into its `(username, confirmation_code)` pair.
pub fn token_request(payload: TokenRequest) -> ApiResult<(String, String)> {
    let mut errors = FieldErrors::new();
    let username = require(&mut errors, "username", payload.username);
    let code = require(&mut errors, "confirmation_code", payload.confirmation_code);
    if username.as_deref().is_some_and(str::is_empty) {
        errors.add("username", BLANK);
    }
    if code.as_deref().is_some_and(str::is_empty) {
        errors.add("confirmation_code", BLANK);
    }
    let (Some(username), Some(code), true) = (username, code, errors.is_empty()) else {
        return Err(ApiError::Validation(errors));
    };
    Ok((username, code))
}

pub fn new_user(payload: CreateUserRequest) -> ApiResult<NewUser> {
    let mut errors = FieldErrors::new();
    let username = require(&mut errors, "username", payload.username);
    let email = require(&mut errors, "email", payload.email);
    if let Some(username) = &username {
        check_username(&mut errors, username);
    }
    if let Some(email) = &email {
        check_email(&mut errors, email);
    }
    check_person_names(
        &mut errors,
        payload.first_name.as_deref(),
        payload.last_name.as_deref(),
    );
    let (Some(username), Some(email), true) = (username, email, errors.is_empty()) else {
        return Err(ApiError::Validation(errors));
    };
    Ok(NewUser {
        username,
        email,
        role: payload.role.unwrap_or_default(),
        is_superuser: false,
        first_name: payload.first_name.unwrap_or_default(),
        last_name: payload.last_name.unwrap_or_default(),
        bio: payload.bio.unwrap_or_default(),
        confirmation_code: None,
    })
}

/// Validates a partial account update. `role` is dropped unless `allow_role`
/// (admins editing an account; `/users/me/` never changes the role).
pub fn user_changes(payload: UpdateUserRequest, allow_role: bool) -> ApiResult<UserChanges> {
    let mut errors = FieldErrors::new();
    if let Some(username) = &payload.username {
        check_username(&mut errors, username);
    }
    if let Some(email) = &payload.email {
        check_email(&mut errors, email);
    }
    check_person_names(
        &mut errors,
        payload.first_name.as_deref(),
        payload.last_name.as_deref(),
    );
    errors.into_result()?;

    Ok(UserChanges {
        username: payload.username,
        email: payload.email,
        role: payload.role.filter(|_| allow_role),
        first_name: payload.first_name,
        last_name: payload.last_name,
        bio: payload.bio,
    })
}

pub fn new_taxon(payload: CreateTaxonRequest) -> ApiResult<NewTaxon> {
    let mut errors = FieldErrors::new();
    let name = require(&mut errors, "name", payload.name);
    let slug = require(&mut errors, "slug", payload.slug);
    if let Some(name) = &name {
        check_text(&mut errors, "name", name, Some(NAME_MAX_LEN));
    }
    if let Some(slug) = &slug {
        check_slug(&mut errors, slug);
    }
    let (Some(name), Some(slug), true) = (name, slug, errors.is_empty()) else {
        return Err(ApiError::Validation(errors));
    };
    Ok(NewTaxon { name, slug })
}

pub fn new_title(payload: CreateTitleRequest) -> ApiResult<NewTitle> {
    let mut errors = FieldErrors::new();
    let name = require(&mut errors, "name", payload.name);
    let year = require(&mut errors, "year", payload.year);
    if let Some(name) = &name {
        check_text(&mut errors, "name", name, Some(NAME_MAX_LEN));
    }
    if let Some(year) = year {
        check_year(&mut errors, year);
    }
    let (Some(name), Some(year), true) = (name, year, errors.is_empty()) else {
        return Err(ApiError::Validation(errors));
    };
    Ok(NewTitle {
        name,
        year,
        description: payload.description.unwrap_or_default(),
        genre: payload.genre,
        category: payload.category,
    })
}

pub fn title_changes(payload: UpdateTitleRequest) -> ApiResult<TitleChanges> {
    let mut errors = FieldErrors::new();
    if let Some(name) = &payload.name {
        check_text(&mut errors, "name", name, Some(NAME_MAX_LEN));
    }
    if let Some(year) = payload.year {
        check_year(&mut errors, year);
    }
    errors.into_result()?;

    Ok(TitleChanges {
        name: payload.name,
        year: payload.year,
        description: payload.description,
        genre: payload.genre,
        category: payload.category,
    })
}

/// Validates a new review into its `(text, score)` pair.
pub fn new_review(payload: CreateReviewRequest) -> ApiResult<(String, i32)> {
    let mut errors = FieldErrors::new();
    let text = require(&mut errors, "text", payload.text);
    let score = require(&mut errors, "score", payload.score);
    if let Some(text) = &text {
        check_text(&mut errors, "text", text, None);
    }
    let score = score.and_then(|score| check_score(&mut errors, score));
    let (Some(text), Some(score), true) = (text, score, errors.is_empty()) else {
        return Err(ApiError::Validation(errors));
    };
    Ok((text, score))
}

pub fn review_changes(payload: UpdateReviewRequest) -> ApiResult<ReviewChanges> {
    let mut errors = FieldErrors::new();
    if let Some(text) = &payload.text {
        check_text(&mut errors, "text", text, None);
    }
    let score = payload
        .score
        .and_then(|score| check_score(&mut errors, score));
    errors.into_result()?;

    Ok(ReviewChanges {
        text: payload.text,
        score,
    })
}

pub fn comment_text(payload: CommentRequest) -> ApiResult<String> {
    let mut errors = FieldErrors::new();
    let text = require(&mut errors, "text", payload.text);
    if let Some(text) = &text {
        check_text(&mut errors, "text", text, None);
    }
    let (Some(text), true) = (text, errors.is_empty()) else {
        return Err(ApiError::Validation(errors));
    };
    Ok(text)
}
