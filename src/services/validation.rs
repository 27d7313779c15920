// Input rules for request payloads. Every failure is an AppError::Validation.

use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::error::{AppError, AppResult};
use crate::models::{GameChanges, GameMode, NewGame, UpsertGameRequest, UserId};

pub const TITLE_MAX_CHARS: usize = 255;
pub const COMMENT_MAX_CHARS: usize = 1000;
pub const PASSWORD_MIN_CHARS: usize = 6;
pub const NAME_MIN_CHARS: usize = 2;
/// Ceiling on the full length of an inline `data:` image.
pub const INLINE_IMAGE_MAX_BYTES: usize = 5_000_000;

const EMBED_PREFIX: &str = "https://www.youtube.com/embed/";

static EMAIL_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

static WATCH_PAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"youtube\.com/watch\?(?:[^#]*&)?v=([^&#]+)").expect("watch pattern is valid")
});

static SHORT_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"youtu\.be/([^?&#/]+)").expect("short link pattern is valid"));

fn invalid(msg: impl Into<String>) -> AppError {
    AppError::Validation(msg.into())
}

/// Trims and maps an empty string to `None`.
fn non_empty(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn is_absolute_url(raw: &str) -> bool {
    Url::parse(raw)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false)
}

pub fn title(raw: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid("Title is required"));
    }
    if trimmed.chars().count() > TITLE_MAX_CHARS {
        return Err(invalid(format!(
            "Title must be at most {} characters",
            TITLE_MAX_CHARS
        )));
    }
    Ok(trimmed.to_string())
}

/// Accepts `YYYY-MM-DD` or a full timestamp, which is truncated to its date.
pub fn release_date(raw: &str) -> AppResult<Option<NaiveDate>> {
    let Some(value) = non_empty(raw) else {
        return Ok(None);
    };

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(Some(date));
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(Some(timestamp.date_naive()));
    }
    if let Ok(timestamp) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(Some(timestamp.date()));
    }
    Err(invalid("Release date must be an ISO-8601 date"))
}

/// An absolute URL or an inline `data:` image.
pub fn image_url(raw: &str) -> AppResult<Option<String>> {
    let Some(value) = non_empty(raw) else {
        return Ok(None);
    };

    if value.starts_with("data:") {
        if value.len() > INLINE_IMAGE_MAX_BYTES {
            return Err(invalid("Image data is too large"));
        }
        if let Some((_, payload)) = value.split_once(";base64,") {
            base64::engine::general_purpose::STANDARD
                .decode(payload)
                .map_err(|_| invalid("Image data is not valid base64"))?;
        }
        return Ok(Some(value.to_string()));
    }

    if is_absolute_url(value) {
        Ok(Some(value.to_string()))
    } else {
        Err(invalid("Image URL must be a valid URL"))
    }
}

/// Watch-page and short-link URLs become embeddable player URLs; any other
/// absolute URL is kept as given.
pub fn trailer_url(raw: &str) -> AppResult<Option<String>> {
    let Some(value) = non_empty(raw) else {
        return Ok(None);
    };

    if let Some(captures) = WATCH_PAGE
        .captures(value)
        .or_else(|| SHORT_LINK.captures(value))
    {
        return Ok(Some(format!("{}{}", EMBED_PREFIX, &captures[1])));
    }

    if is_absolute_url(value) {
        Ok(Some(value.to_string()))
    } else {
        Err(invalid("Trailer URL must be a valid URL"))
    }
}

pub fn game_mode(raw: &str) -> AppResult<GameMode> {
    match non_empty(raw) {
        None => Ok(GameMode::default()),
        Some(value) => value.parse().map_err(invalid),
    }
}

fn optional_text(raw: &Option<String>) -> Option<String> {
    raw.as_deref().and_then(non_empty).map(str::to_string)
}

pub fn new_game(request: &UpsertGameRequest, created_by: UserId) -> AppResult<NewGame> {
    let title = title(request.title.as_deref().unwrap_or_default())?;

    Ok(NewGame {
        title,
        description: optional_text(&request.description),
        genre: optional_text(&request.genre),
        platform: optional_text(&request.platform),
        release_date: match &request.release_date {
            Some(raw) => release_date(raw)?,
            None => None,
        },
        image_url: match &request.image_url {
            Some(raw) => image_url(raw)?,
            None => None,
        },
        trailer_url: match &request.trailer_url {
            Some(raw) => trailer_url(raw)?,
            None => None,
        },
        game_mode: match &request.game_mode {
            Some(raw) => game_mode(raw)?,
            None => GameMode::default(),
        },
        created_by,
    })
}

/// Only fields present in the request are changed; an empty string clears
/// a nullable field.
pub fn game_changes(request: &UpsertGameRequest) -> AppResult<GameChanges> {
    let changes = GameChanges {
        title: request.title.as_deref().map(title).transpose()?,
        description: request.description.as_ref().map(|_| optional_text(&request.description)),
        genre: request.genre.as_ref().map(|_| optional_text(&request.genre)),
        platform: request.platform.as_ref().map(|_| optional_text(&request.platform)),
        release_date: request.release_date.as_deref().map(release_date).transpose()?,
        image_url: request.image_url.as_deref().map(image_url).transpose()?,
        trailer_url: request.trailer_url.as_deref().map(trailer_url).transpose()?,
        game_mode: request.game_mode.as_deref().map(game_mode).transpose()?,
    };

    if changes.is_empty() {
        return Err(invalid("No fields to update"));
    }
    Ok(changes)
}

/// Trimmed and lower-cased.
pub fn email(raw: &str) -> AppResult<String> {
    let normalized = raw.trim().to_lowercase();
    if EMAIL_SHAPE.is_match(&normalized) {
        Ok(normalized)
    } else {
        Err(invalid("A valid email is required"))
    }
}

pub fn new_password(raw: &str) -> AppResult<()> {
    if raw.chars().count() < PASSWORD_MIN_CHARS {
        return Err(invalid(format!(
            "Password must be at least {} characters",
            PASSWORD_MIN_CHARS
        )));
    }
    Ok(())
}

pub fn display_name(raw: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    if trimmed.chars().count() < NAME_MIN_CHARS {
        return Err(invalid(format!(
            "Name must be at least {} characters",
            NAME_MIN_CHARS
        )));
    }
    Ok(trimmed.to_string())
}

pub fn comment_content(raw: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    let length = trimmed.chars().count();
    if length == 0 {
        return Err(invalid("Content is required"));
    }
    if length > COMMENT_MAX_CHARS {
        return Err(invalid(format!(
            "Content must be at most {} characters",
            COMMENT_MAX_CHARS
        )));
    }
    Ok(trimmed.to_string())
}

pub fn rating_value(raw: i64) -> AppResult<i32> {
    match raw {
        1..=5 => Ok(raw as i32),
        _ => Err(invalid("Rating must be an integer between 1 and 5")),
    }
}

/// Substring pattern for LIKE/ILIKE with `\` as the escape character.
/// A blank query would match every title, so it is rejected.
pub fn like_pattern(query: &str) -> AppResult<String> {
    let Some(query) = non_empty(query) else {
        return Err(invalid("Search query is required"));
    };

    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    Ok(pattern)
}
