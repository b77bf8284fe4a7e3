use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::models::{NewColumn, NewComment, PostDraft};
use crate::sanitize::sanitize_comment_input;

pub const MAX_COMMENT_CHARS: usize = 1000;
pub const MAX_NAME_CHARS: usize = 50;
pub const MAX_EMAIL_CHARS: usize = 100;
pub const MIN_PASSWORD_CHARS: usize = 6;
pub const UNTITLED_POST: &str = "Untitled post";

lazy_static! {
    static ref EMAIL: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
    static ref TITLE_TAG: Regex = Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap();
    static ref SLUG_STRIP: Regex = Regex::new(r"[^\w\s-]").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref DASHES: Regex = Regex::new(r"-+").unwrap();
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please enter a comment")]
    EmptyContent,
    #[error("Please enter a name")]
    EmptyName,
    #[error("Please enter an email address")]
    EmptyEmail,
    #[error("Please enter a valid email address")]
    InvalidEmail,
    #[error("Comments cannot exceed {max} characters")]
    ContentTooLong { max: usize },
    #[error("Names cannot exceed {max} characters")]
    NameTooLong { max: usize },
    #[error("Email addresses cannot exceed {max} characters")]
    EmailTooLong { max: usize },
    #[error("Please enter both a column title and a description")]
    IncompleteColumn,
    #[error("Post content cannot be empty")]
    EmptyPost,
    #[error("Please enter your email and password")]
    MissingCredentials,
    #[error("Passwords are at least {min} characters")]
    PasswordTooShort { min: usize },
}

/// Raw text of the comment and reply forms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentForm {
    pub content: String,
    pub author_name: String,
    pub author_email: String,
}

impl CommentForm {
    /// Validates the form and produces a sanitized insert payload.
    pub fn validate(&self, post_id: &str, parent_id: Option<&str>) -> Result<NewComment, ValidationError> {
        let content = self.content.trim();
        let name = self.author_name.trim();
        let email = self.author_email.trim();

        if content.is_empty() {
            return Err(ValidationError::EmptyContent);
        }
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if email.is_empty() {
            return Err(ValidationError::EmptyEmail);
        }
        if !EMAIL.is_match(email) {
            return Err(ValidationError::InvalidEmail);
        }
        if self.content.chars().count() > MAX_COMMENT_CHARS {
            return Err(ValidationError::ContentTooLong { max: MAX_COMMENT_CHARS });
        }
        if name.chars().count() > MAX_NAME_CHARS {
            return Err(ValidationError::NameTooLong { max: MAX_NAME_CHARS });
        }
        if email.chars().count() > MAX_EMAIL_CHARS {
            return Err(ValidationError::EmailTooLong { max: MAX_EMAIL_CHARS });
        }

        Ok(NewComment {
            post_id: post_id.to_string(),
            parent_id: parent_id.map(str::to_string),
            content: sanitize_comment_input(content),
            author_name: name.to_string(),
            author_email: email.to_string(),
        })
    }

    /// Clears the comment body but keeps the author details for the next one.
    pub fn clear_content(&mut self) {
        self.content.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteForm {
    pub content: String,
    pub slug: String,
    pub is_published: bool,
    pub column_id: Option<String>,
}

impl Default for WriteForm {
    fn default() -> Self {
        Self {
            content: String::new(),
            slug: String::new(),
            is_published: true,
            column_id: None,
        }
    }
}

impl WriteForm {
    pub fn to_draft(&self) -> Result<PostDraft, ValidationError> {
        if self.content.trim().is_empty() {
            return Err(ValidationError::EmptyPost);
        }

        let title = extract_title(&self.content);
        let slug = match self.slug.trim() {
            "" => generate_slug(&title),
            custom => custom.to_string(),
        };

        Ok(PostDraft {
            title,
            content: self.content.clone(),
            is_published: self.is_published,
            column_id: self.column_id.clone().filter(|id| !id.is_empty()),
            slug: Some(slug).filter(|s| !s.is_empty()),
        })
    }
}

/// Post titles live in the content's `<title>` element.
pub fn extract_title(content: &str) -> String {
    TITLE_TAG
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| html_escape::decode_html_entities(m.as_str().trim()).to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| UNTITLED_POST.to_string())
}

pub fn generate_slug(title: &str) -> String {
    let lowered = title.to_lowercase();
    let stripped = SLUG_STRIP.replace_all(&lowered, "");
    let dashed = WHITESPACE.replace_all(stripped.trim(), "-");
    DASHES.replace_all(&dashed, "-").trim_matches('-').to_string()
}

pub fn validate_column(title: &str, description: &str) -> Result<NewColumn, ValidationError> {
    let title = title.trim();
    let description = description.trim();
    if title.is_empty() || description.is_empty() {
        return Err(ValidationError::IncompleteColumn);
    }
    Ok(NewColumn {
        title: title.to_string(),
        description: description.to_string(),
    })
}

pub fn validate_login(email: &str, password: &str) -> Result<(), ValidationError> {
    if email.trim().is_empty() || password.trim().is_empty() {
        return Err(ValidationError::MissingCredentials);
    }
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ValidationError::PasswordTooShort { min: MIN_PASSWORD_CHARS });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(content: &str, name: &str, email: &str) -> CommentForm {
        CommentForm {
            content: content.to_string(),
            author_name: name.to_string(),
            author_email: email.to_string(),
        }
    }

    #[test]
    fn valid_comment_is_trimmed_and_escaped() {
        let comment = form("  <b>hey</b>  ", " Ann ", "ann@example.com ")
            .validate("p1", Some("c9"))
            .unwrap();
        assert_eq!(comment.post_id, "p1");
        assert_eq!(comment.parent_id.as_deref(), Some("c9"));
        assert_eq!(comment.author_name, "Ann");
        assert_eq!(comment.author_email, "ann@example.com");
        assert!(comment.content.starts_with("&lt;b&gt;hey"));
    }

    #[test]
    fn missing_fields_are_reported_in_order() {
        assert_eq!(form(" ", "a", "a@b.c").validate("p", None), Err(ValidationError::EmptyContent));
        assert_eq!(form("x", "", "a@b.c").validate("p", None), Err(ValidationError::EmptyName));
        assert_eq!(form("x", "a", " ").validate("p", None), Err(ValidationError::EmptyEmail));
    }

    #[test]
    fn email_format_is_checked() {
        for bad in ["plain", "a@b", "a b@c.d", "@b.c"] {
            assert_eq!(form("x", "a", bad).validate("p", None), Err(ValidationError::InvalidEmail), "{}", bad);
        }
        assert!(form("x", "a", "first.last@sub.example.org").validate("p", None).is_ok());
    }

    #[test]
    fn content_length_limit() {
        let at_limit = "x".repeat(MAX_COMMENT_CHARS);
        assert!(form(&at_limit, "a", "a@b.c").validate("p", None).is_ok());

        let over = "x".repeat(MAX_COMMENT_CHARS + 1);
        assert_eq!(
            form(&over, "a", "a@b.c").validate("p", None),
            Err(ValidationError::ContentTooLong { max: MAX_COMMENT_CHARS })
        );
    }

    #[test]
    fn title_comes_from_title_tag() {
        let content = "<!DOCTYPE html><html><head><TITLE> Rust &amp; Me </TITLE></head><body></body></html>";
        assert_eq!(extract_title(content), "Rust & Me");
        assert_eq!(extract_title("<p>no title</p>"), UNTITLED_POST);
    }

    #[test]
    fn slug_generation() {
        assert_eq!(generate_slug("Hello, World!  Again"), "hello-world-again");
        assert_eq!(generate_slug("a -- b"), "a-b");
        assert_eq!(generate_slug("学习 Rust"), "学习-rust");
    }

    #[test]
    fn write_form_uses_custom_slug_when_given() {
        let mut form = WriteForm {
            content: "<title>My Post</title><p>x</p>".to_string(),
            ..WriteForm::default()
        };
        assert_eq!(form.to_draft().unwrap().slug.as_deref(), Some("my-post"));

        form.slug = " custom ".to_string();
        form.column_id = Some(String::new());
        let draft = form.to_draft().unwrap();
        assert_eq!(draft.slug.as_deref(), Some("custom"));
        assert_eq!(draft.column_id, None);
        assert_eq!(draft.title, "My Post");
    }

    #[test]
    fn column_and_login_checks() {
        assert_eq!(validate_column("t", " "), Err(ValidationError::IncompleteColumn));
        assert!(validate_column("t", "d").is_ok());

        assert_eq!(validate_login("", "secret1"), Err(ValidationError::MissingCredentials));
        assert_eq!(validate_login("a@b.c", "12345"), Err(ValidationError::PasswordTooShort { min: 6 }));
        assert!(validate_login("a@b.c", "123456").is_ok());
    }
}
