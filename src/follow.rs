use http::StatusCode;
use spin_sdk::http::Response;

use crate::config::*;
use crate::core::db::Db;
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, no_content, validate_uuid};
use crate::handlers::AppState;
use crate::models::models::{Followings, Identity, User, UserProfile};
use crate::policy::deny_self_reference;
use crate::users::load_user;

/// Records that `follower_id` follows `following_id`. Following twice leaves
/// a single edge.
pub fn follow_user(db: &Db, follower_id: &str, following_id: &str) -> anyhow::Result<()> {
    let key = followings_key(follower_id);
    let mut followings: Followings = db.get_list(&key)?;

    if !followings.iter().any(|id| id == following_id) {
        followings.push(following_id.to_string());
        db.set_json(&key, &followings)?;
    }
    Ok(())
}

pub fn unfollow_user(db: &Db, follower_id: &str, following_id: &str) -> anyhow::Result<()> {
    let key = followings_key(follower_id);
    let mut followings: Followings = db.get_list(&key)?;

    followings.retain(|id| id != following_id);
    db.set_json(&key, &followings)?;
    Ok(())
}

pub fn get_followings(db: &Db, user_id: &str) -> anyhow::Result<Followings> {
    db.get_list(&followings_key(user_id))
}

pub fn get_followers(db: &Db, user_id: &str) -> anyhow::Result<Vec<String>> {
    let mut followers = Vec::new();

    for id in db.get_list(USERS_LIST_KEY)? {
        if get_followings(db, &id)?.iter().any(|followed| followed == user_id) {
            followers.push(id);
        }
    }
    Ok(followers)
}

/// Drops every edge that starts or ends at `user_id`.
pub fn remove_all_edges(db: &Db, user_id: &str) -> anyhow::Result<()> {
    for follower in get_followers(db, user_id)? {
        unfollow_user(db, &follower, user_id)?;
    }
    db.delete(&followings_key(user_id))
}

/// `follower` starts following `target`.
pub fn follow(db: &Db, follower: &Identity, target: &Identity) -> Result<(), ApiError> {
    deny_self_reference(target, follower)?;

    db.exclusive(|| {
        load_user(db, target.as_str())?;
        follow_user(db, follower.as_str(), target.as_str())?;
        Ok::<_, ApiError>(())
    })?;
    tracing::info!(follower = %follower, target = %target, "followed");
    Ok(())
}

pub fn unfollow(db: &Db, follower: &Identity, target: &Identity) -> Result<(), ApiError> {
    deny_self_reference(target, follower)?;

    db.exclusive(|| unfollow_user(db, follower.as_str(), target.as_str()))?;
    tracing::info!(follower = %follower, target = %target, "unfollowed");
    Ok(())
}

fn profiles(db: &Db, ids: Vec<String>) -> anyhow::Result<Vec<UserProfile>> {
    let mut found = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(user) = db.get_json::<User>(&user_key(&id))? {
            found.push(UserProfile::from(&user));
        }
    }
    Ok(found)
}

fn target_id(raw: &str) -> Result<Identity, ApiError> {
    if !validate_uuid(raw) {
        return Err(ApiError::Validation("invalid user id".to_string()));
    }
    Ok(Identity::new(raw))
}

// === HTTP Handlers ===

pub fn handle_follow(state: &AppState, identity: Identity, id: &str) -> Result<Response, ApiError> {
    follow(&state.db, &identity, &target_id(id)?)?;
    Ok(no_content())
}

pub fn handle_unfollow(state: &AppState, identity: Identity, id: &str) -> Result<Response, ApiError> {
    unfollow(&state.db, &identity, &target_id(id)?)?;
    Ok(no_content())
}

pub fn get_followers_list(state: &AppState, id: &str) -> Result<Response, ApiError> {
    let user = target_id(id)?;
    let followers = get_followers(&state.db, user.as_str())?;
    json_response(StatusCode::OK, &profiles(&state.db, followers)?)
}

pub fn get_followings_list(state: &AppState, id: &str) -> Result<Response, ApiError> {
    let user = target_id(id)?;
    let followings = get_followings(&state.db, user.as_str())?;
    json_response(StatusCode::OK, &profiles(&state.db, followings)?)
}
