use anyhow::{anyhow, Context, Result};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::auth::SessionHandle;
use crate::config::AppConfig;
use crate::models::{Column, CommentRecord, NewColumn, NewComment, Post, PostDraft, PostPage};

pub const POSTS_PER_PAGE: usize = 10;

/// Collection operations against the hosted record store.
#[cfg_attr(test, mockall::automock)]
pub trait RecordStore: Send + Sync {
    /// Published posts that are not filed under a column, newest first.
    fn list_home_posts(&self, page: usize) -> Result<PostPage>;
    fn list_columns(&self) -> Result<Vec<Column>>;
    fn get_post(&self, id: &str) -> Result<Post>;
    fn get_column(&self, id: &str) -> Result<Column>;
    fn list_column_posts(&self, column_id: &str) -> Result<Vec<Post>>;
    /// Comments on one post in ascending creation order.
    fn list_comments(&self, post_id: &str) -> Result<Vec<CommentRecord>>;
    fn insert_comment(&self, comment: &NewComment) -> Result<()>;
    /// Returns the id of the created post.
    fn insert_post(&self, draft: &PostDraft) -> Result<String>;
    fn update_post(&self, id: &str, draft: &PostDraft) -> Result<()>;
    fn delete_post(&self, id: &str) -> Result<()>;
    fn insert_column(&self, column: &NewColumn) -> Result<()>;
}

/// PostgREST client for the `posts`, `columns` and `comments` collections.
pub struct SupabaseStore {
    client: Client,
    rest_url: String,
    anon_key: String,
    session: SessionHandle,
}

#[derive(Deserialize)]
struct CreatedId {
    id: String,
}

impl SupabaseStore {
    pub fn new(config: &AppConfig, session: SessionHandle) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("blog_reader/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", config.supabase_url.trim_end_matches('/')),
            anon_key: config.supabase_anon_key.clone(),
            session,
        })
    }

    fn bearer(&self) -> String {
        let token = self
            .session
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().map(|s| s.access_token.clone()));
        token.unwrap_or_else(|| self.anon_key.clone())
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer())
    }

    fn select<T: DeserializeOwned>(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<T>> {
        let url = format!("{}/{}", self.rest_url, table);
        debug!(table, ?query, "select");
        let response = self.authorize(self.client.get(&url)).query(query).send()?;
        let rows = check(response, table)?.json::<Vec<T>>()?;
        Ok(rows)
    }

    fn select_by_id<T: DeserializeOwned>(&self, table: &str, id: &str) -> Result<T> {
        self.select(table, &[("select", "*".to_string()), ("id", eq(id))])?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("{} {} not found", table, id))
    }
}

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

fn check(response: Response, table: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    debug!(table, %status, body = %body, "record store error");
    Err(anyhow!("Request to {} failed ({})", table, status))
}

impl RecordStore for SupabaseStore {
    fn list_home_posts(&self, page: usize) -> Result<PostPage> {
        let page = page.max(1);
        let offset = (page - 1) * POSTS_PER_PAGE;
        let posts: Vec<Post> = self.select(
            "posts",
            &[
                ("select", "*".to_string()),
                ("is_published", "eq.true".to_string()),
                ("column_id", "is.null".to_string()),
                ("order", "created_at.desc".to_string()),
                ("offset", offset.to_string()),
                ("limit", POSTS_PER_PAGE.to_string()),
            ],
        )?;
        let has_more = posts.len() == POSTS_PER_PAGE;
        Ok(PostPage { posts, has_more })
    }

    fn list_columns(&self) -> Result<Vec<Column>> {
        self.select(
            "columns",
            &[("select", "*".to_string()), ("order", "created_at.desc".to_string())],
        )
    }

    fn get_post(&self, id: &str) -> Result<Post> {
        self.select_by_id("posts", id)
    }

    fn get_column(&self, id: &str) -> Result<Column> {
        self.select_by_id("columns", id)
    }

    fn list_column_posts(&self, column_id: &str) -> Result<Vec<Post>> {
        self.select(
            "posts",
            &[
                ("select", "*".to_string()),
                ("column_id", eq(column_id)),
                ("is_published", "eq.true".to_string()),
                ("order", "created_at.desc".to_string()),
            ],
        )
    }

    fn list_comments(&self, post_id: &str) -> Result<Vec<CommentRecord>> {
        self.select(
            "comments",
            &[
                ("select", "*".to_string()),
                ("post_id", eq(post_id)),
                ("order", "created_at.asc".to_string()),
            ],
        )
    }

    fn insert_comment(&self, comment: &NewComment) -> Result<()> {
        let url = format!("{}/comments", self.rest_url);
        let response = self.authorize(self.client.post(&url)).json(&[comment]).send()?;
        check(response, "comments")?;
        info!(post_id = %comment.post_id, "comment inserted");
        Ok(())
    }

    fn insert_post(&self, draft: &PostDraft) -> Result<String> {
        let url = format!("{}/posts", self.rest_url);
        let response = self
            .authorize(self.client.post(&url))
            .header("Prefer", "return=representation")
            .query(&[("select", "id")])
            .json(&[draft])
            .send()?;
        let created: Vec<CreatedId> = check(response, "posts")?.json()?;
        let id = created
            .into_iter()
            .next()
            .map(|c| c.id)
            .ok_or_else(|| anyhow!("Post was created but no id was returned"))?;
        info!(id = %id, "post created");
        Ok(id)
    }

    fn update_post(&self, id: &str, draft: &PostDraft) -> Result<()> {
        let url = format!("{}/posts", self.rest_url);
        let response = self
            .authorize(self.client.patch(&url))
            .query(&[("id", eq(id))])
            .json(draft)
            .send()?;
        check(response, "posts")?;
        info!(id, "post updated");
        Ok(())
    }

    fn delete_post(&self, id: &str) -> Result<()> {
        let url = format!("{}/posts", self.rest_url);
        let response = self
            .authorize(self.client.delete(&url))
            .query(&[("id", eq(id))])
            .send()?;
        check(response, "posts")?;
        info!(id, "post deleted");
        Ok(())
    }

    fn insert_column(&self, column: &NewColumn) -> Result<()> {
        let url = format!("{}/columns", self.rest_url);
        let response = self.authorize(self.client.post(&url)).json(&[column]).send()?;
        check(response, "columns")?;
        info!(title = %column.title, "column created");
        Ok(())
    }
}

/// Shareable link to a post on the public site.
pub fn post_link(site_url: &str, post: &Post) -> String {
    let segment = post.slug.as_deref().filter(|s| !s.is_empty()).unwrap_or(&post.id);
    format!("{}/posts/{}", site_url.trim_end_matches('/'), urlencoding::encode(segment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn post(id: &str, slug: Option<&str>) -> Post {
        Post {
            id: id.to_string(),
            title: "t".to_string(),
            content: String::new(),
            created_at: Utc::now(),
            updated_at: None,
            is_published: true,
            column_id: None,
            slug: slug.map(str::to_string),
        }
    }

    #[test]
    fn post_link_prefers_slug_and_encodes() {
        assert_eq!(
            post_link("https://blog.example/", &post("42", Some("rust tips"))),
            "https://blog.example/posts/rust%20tips"
        );
        assert_eq!(post_link("https://blog.example", &post("42", None)), "https://blog.example/posts/42");
    }

    #[test]
    fn filters_use_postgrest_syntax() {
        assert_eq!(eq("abc"), "eq.abc");
    }
}
