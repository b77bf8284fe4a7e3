use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default = "published_by_default")]
    pub is_published: bool,
    #[serde(default)]
    pub column_id: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

fn published_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// A comment row as stored: flat, with an optional parent reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: String,
    pub post_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub content: String,
    pub author_name: String,
    pub author_email: String,
    pub created_at: DateTime<Utc>,
}

/// A comment placed in the reply tree. Built per render, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentNode {
    pub record: CommentRecord,
    pub replies: Vec<CommentNode>,
}

impl From<CommentRecord> for CommentNode {
    fn from(record: CommentRecord) -> Self {
        Self {
            record,
            replies: Vec::new(),
        }
    }
}

impl CommentNode {
    /// Number of nodes below this one, at any depth.
    pub fn descendant_count(&self) -> usize {
        self.replies
            .iter()
            .map(|reply| 1 + reply.descendant_count())
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewComment {
    pub post_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub content: String,
    pub author_name: String,
    pub author_email: String,
}

/// Insert/update payload for the write form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostDraft {
    pub title: String,
    pub content: String,
    pub is_published: bool,
    pub column_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewColumn {
    pub title: String,
    pub description: String,
}

/// One page of the homepage post list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub has_more: bool,
}

/// A column together with the published posts filed under it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDetail {
    pub column: Column,
    pub posts: Vec<Post>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_defaults_optional_fields() {
        let json = r#"{"id":"p1","title":"Hi","content":"<p>x</p>","created_at":"2024-05-01T10:00:00Z"}"#;
        let post: Post = serde_json::from_str(json).unwrap();
        assert!(post.is_published);
        assert_eq!(post.column_id, None);
        assert_eq!(post.slug, None);
    }

    #[test]
    fn new_comment_omits_missing_parent() {
        let comment = NewComment {
            post_id: "p1".into(),
            parent_id: None,
            content: "hello".into(),
            author_name: "ann".into(),
            author_email: "ann@example.com".into(),
        };
        let json = serde_json::to_value(&comment).unwrap();
        assert!(json.get("parent_id").is_none());
    }
}
