use http::StatusCode;
use spin_sdk::http::{Request, Response};
use uuid::Uuid;

use crate::config::*;
use crate::core::db::Db;
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, no_content, now_iso, parse_body, validate_uuid};
use crate::follow::get_followings;
use crate::handlers::AppState;
use crate::models::models::{Identity, Post, PostInput};
use crate::policy::{authorize_post_mutation, ResourceOwners};
use crate::users::load_user;

/// Trims title and content and rejects empty ones.
pub fn validate_post(input: PostInput) -> Result<PostInput, ApiError> {
    let title = input.title.trim();
    let content = input.content.trim();

    if title.is_empty() {
        return Err(ApiError::Validation("title is required".to_string()));
    }
    if content.is_empty() {
        return Err(ApiError::Validation("content is required".to_string()));
    }
    Ok(PostInput {
        title: title.to_string(),
        content: content.to_string(),
    })
}

fn post_id(raw: &str) -> Result<&str, ApiError> {
    if !validate_uuid(raw) {
        return Err(ApiError::Validation("invalid post id".to_string()));
    }
    Ok(raw)
}

fn not_found() -> ApiError {
    ApiError::NotFound("post not found".to_string())
}

pub fn load_post(db: &Db, id: &str) -> Result<Post, ApiError> {
    db.get_json::<Post>(&post_key(id))?.ok_or_else(not_found)
}

/// Iterates the global feed, newest first, keeping posts that match.
fn collect_feed<F>(db: &Db, mut keep: F) -> anyhow::Result<Vec<Post>>
where
    F: FnMut(&Post) -> bool,
{
    let mut posts = Vec::new();
    for id in db.get_list(FEED_KEY)? {
        if let Some(post) = db.get_json::<Post>(&post_key(&id))? {
            if keep(&post) {
                posts.push(post);
            }
        }
    }
    Ok(posts)
}

pub fn create(db: &Db, author: &Identity, input: PostInput) -> Result<Post, ApiError> {
    let input = validate_post(input)?;

    let post = db.exclusive(|| {
        let author = load_user(db, author.as_str())?;
        let post = Post {
            id: Uuid::new_v4().to_string(),
            title: input.title,
            content: input.content,
            author_id: author.id,
            author_nick: author.nick,
            likes: 0,
            created_at: now_iso(),
        };
        db.set_json(&post_key(&post.id), &post)?;

        let mut feed = db.get_list(FEED_KEY)?;
        feed.insert(0, post.id.clone());
        db.set_json(FEED_KEY, &feed)?;
        Ok::<_, ApiError>(post)
    })?;

    tracing::info!(post_id = %post.id, author = %post.author_id, "post created");
    Ok(post)
}

/// The caller's own posts plus those of everyone they follow, newest first.
pub fn feed_for(db: &Db, identity: &Identity) -> anyhow::Result<Vec<Post>> {
    let followings = get_followings(db, identity.as_str())?;
    collect_feed(db, |post| {
        post.author_id == identity.as_str() || followings.contains(&post.author_id)
    })
}

pub fn posts_by(db: &Db, author_id: &str) -> anyhow::Result<Vec<Post>> {
    collect_feed(db, |post| post.author_id == author_id)
}

pub fn update(db: &Db, identity: &Identity, id: &str, input: PostInput) -> Result<(), ApiError> {
    let input = validate_post(input)?;

    db.exclusive(|| {
        authorize_post_mutation(db, identity, id)?;

        let mut post = load_post(db, id)?;
        post.title = input.title;
        post.content = input.content;
        db.set_json(&post_key(id), &post)?;
        Ok::<_, ApiError>(())
    })
}

fn remove(db: &Db, id: &str) -> anyhow::Result<()> {
    db.delete(&post_key(id))?;

    let mut feed = db.get_list(FEED_KEY)?;
    feed.retain(|existing| existing != id);
    db.set_json(FEED_KEY, &feed)
}

pub fn delete(db: &Db, identity: &Identity, id: &str) -> Result<(), ApiError> {
    db.exclusive(|| {
        authorize_post_mutation(db, identity, id)?;
        remove(db, id)?;
        Ok::<_, ApiError>(())
    })?;
    tracing::info!(post_id = %id, "post deleted");
    Ok(())
}

/// Removes every post written by `author_id`.
pub fn delete_posts_by(db: &Db, author_id: &str) -> anyhow::Result<()> {
    for post in posts_by(db, author_id)? {
        remove(db, &post.id)?;
    }
    Ok(())
}

fn adjust_likes(db: &Db, id: &str, adjust: impl FnOnce(u64) -> u64) -> Result<(), ApiError> {
    db.exclusive(|| {
        let mut post = load_post(db, id)?;
        post.likes = adjust(post.likes);
        db.set_json(&post_key(id), &post)?;
        Ok(())
    })
}

pub fn like(db: &Db, id: &str) -> Result<(), ApiError> {
    adjust_likes(db, id, |likes| likes + 1)
}

/// Never takes the count below zero.
pub fn unlike(db: &Db, id: &str) -> Result<(), ApiError> {
    adjust_likes(db, id, |likes| likes.saturating_sub(1))
}

impl ResourceOwners for Db {
    fn owner(&self, resource_id: &str) -> Result<Identity, ApiError> {
        load_post(self, resource_id).map(|post| Identity::new(post.author_id))
    }
}

// === HTTP Handlers ===

pub fn create_post(state: &AppState, req: &Request, identity: Identity) -> Result<Response, ApiError> {
    let input: PostInput = parse_body(req)?;
    let post = create(&state.db, &identity, input)?;
    json_response(StatusCode::CREATED, &post)
}

pub fn get_feed(state: &AppState, identity: Identity) -> Result<Response, ApiError> {
    json_response(StatusCode::OK, &feed_for(&state.db, &identity)?)
}

pub fn get_post(state: &AppState, id: &str) -> Result<Response, ApiError> {
    let post = load_post(&state.db, post_id(id)?)?;
    json_response(StatusCode::OK, &post)
}

pub fn edit_post(
    state: &AppState,
    req: &Request,
    identity: Identity,
    id: &str,
) -> Result<Response, ApiError> {
    let id = post_id(id)?;
    let input: PostInput = parse_body(req)?;
    update(&state.db, &identity, id, input)?;
    Ok(no_content())
}

pub fn delete_post(state: &AppState, identity: Identity, id: &str) -> Result<Response, ApiError> {
    delete(&state.db, &identity, post_id(id)?)?;
    Ok(no_content())
}

pub fn list_user_posts(state: &AppState, user_id: &str) -> Result<Response, ApiError> {
    if !validate_uuid(user_id) {
        return Err(ApiError::Validation("invalid user id".to_string()));
    }
    json_response(StatusCode::OK, &posts_by(&state.db, user_id)?)
}

pub fn like_post(state: &AppState, id: &str) -> Result<Response, ApiError> {
    like(&state.db, post_id(id)?)?;
    Ok(no_content())
}

pub fn unlike_post(state: &AppState, id: &str) -> Result<Response, ApiError> {
    unlike(&state.db, post_id(id)?)?;
    Ok(no_content())
}
