use std::sync::OnceLock;

use http::StatusCode;
use regex::Regex;
use spin_sdk::http::{Request, Response};

use crate::config::*;
use crate::core::db::Db;
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, no_content, now_iso, parse_body, validate_uuid};
use crate::core::query_params::{get_string, parse_query_params};
use crate::crypt::hash_password;
use crate::follow::remove_all_edges;
use crate::handlers::AppState;
use crate::models::models::{Identity, NewUser, PasswordChange, User, UserProfile};
use crate::policy::{reauthenticate, require_self, CredentialStore};
use crate::posts::delete_posts_by;

/// Which fields a payload must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Register,
    Edit,
}

fn name_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[A-Za-z\s]{3,}$").expect("Regex should compile"))
}

fn email_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@.]+(\.[^\s@.]+)*$").expect("Regex should compile")
    })
}

/// Trims the free-text fields. The password is taken as typed.
pub fn normalize(mut candidate: NewUser) -> NewUser {
    candidate.name = candidate.name.trim().to_string();
    candidate.nick = candidate.nick.trim().to_string();
    candidate.email = candidate.email.trim().to_string();
    candidate
}

pub fn validate(candidate: &NewUser, step: Step) -> Result<(), ApiError> {
    let invalid = |message: &str| Err(ApiError::Validation(message.to_string()));

    if candidate.name.is_empty() {
        return invalid("username is required");
    }
    if !name_regex().is_match(&candidate.name) {
        return invalid("username must have three or more characters");
    }
    if candidate.nick.is_empty() {
        return invalid("nick is required");
    }
    if candidate.email.is_empty() {
        return invalid("email is required");
    }
    if !email_regex().is_match(&candidate.email) {
        return invalid("invalid email");
    }
    if step == Step::Register && candidate.password.is_empty() {
        return invalid("password is required");
    }
    Ok(())
}

fn indexed_owner(db: &Db, key: &str) -> anyhow::Result<Option<String>> {
    db.get_json::<String>(key)
}

/// Fails with `Conflict` when `email` or `nick` already belongs to someone
/// other than `owner`.
fn ensure_unique(db: &Db, email: &str, nick: &str, owner: Option<&str>) -> Result<(), ApiError> {
    let taken_by_other = |id: Option<String>| matches!(id, Some(id) if Some(id.as_str()) != owner);

    if taken_by_other(indexed_owner(db, &email_key(email))?) {
        return Err(ApiError::Conflict("email already in use".to_string()));
    }
    if taken_by_other(indexed_owner(db, &nick_key(nick))?) {
        return Err(ApiError::Conflict("nick already in use".to_string()));
    }
    Ok(())
}

/// Trims then validates a payload.
pub fn prepare(candidate: NewUser, step: Step) -> Result<NewUser, ApiError> {
    let candidate = normalize(candidate);
    validate(&candidate, step)?;
    Ok(candidate)
}

/// Validates, hashes and stores a new account.
pub fn register(db: &Db, candidate: NewUser) -> Result<User, ApiError> {
    let candidate = prepare(candidate, Step::Register)?;
    let password = hash_password(&candidate.password)?;

    let user = db.exclusive(|| {
        ensure_unique(db, &candidate.email, &candidate.nick, None)?;

        let user = User {
            id: Identity::generate().to_string(),
            name: candidate.name,
            nick: candidate.nick,
            email: candidate.email,
            password,
            created_at: now_iso(),
            updated_at: None,
        };

        db.set_json(&user_key(&user.id), &user)?;
        db.set_json(&email_key(&user.email), &user.id)?;
        db.set_json(&nick_key(&user.nick), &user.id)?;

        let mut users = db.get_list(USERS_LIST_KEY)?;
        users.push(user.id.clone());
        db.set_json(USERS_LIST_KEY, &users)?;
        Ok::<_, ApiError>(user)
    })?;

    tracing::info!(user_id = %user.id, "user registered");
    Ok(user)
}

pub fn find_by_email(db: &Db, email: &str) -> anyhow::Result<Option<User>> {
    match indexed_owner(db, &email_key(email))? {
        Some(id) => db.get_json::<User>(&user_key(&id)),
        None => Ok(None),
    }
}

pub fn load_user(db: &Db, id: &str) -> Result<User, ApiError> {
    db.get_json::<User>(&user_key(id))?
        .ok_or_else(|| ApiError::NotFound("user not found".to_string()))
}

/// Users whose name or nick contains `term`, ignoring case. An empty term
/// matches everyone.
pub fn search(db: &Db, term: &str) -> anyhow::Result<Vec<UserProfile>> {
    let term = term.trim().to_lowercase();
    let mut found = Vec::new();

    for id in db.get_list(USERS_LIST_KEY)? {
        if let Some(user) = db.get_json::<User>(&user_key(&id))? {
            if user.name.to_lowercase().contains(&term) || user.nick.to_lowercase().contains(&term)
            {
                found.push(UserProfile::from(&user));
            }
        }
    }
    Ok(found)
}

/// Replaces name, nick and email, keeping the uniqueness indexes in step.
/// `changes` must come from [`prepare`] with [`Step::Edit`].
pub fn update(db: &Db, id: &str, changes: NewUser) -> Result<User, ApiError> {
    db.exclusive(|| {
        let mut user = load_user(db, id)?;
        ensure_unique(db, &changes.email, &changes.nick, Some(id))?;

        if user.email != changes.email {
            db.delete(&email_key(&user.email))?;
            db.set_json(&email_key(&changes.email), &user.id)?;
        }
        if user.nick != changes.nick {
            db.delete(&nick_key(&user.nick))?;
            db.set_json(&nick_key(&changes.nick), &user.id)?;
        }

        user.name = changes.name;
        user.nick = changes.nick;
        user.email = changes.email;
        user.updated_at = Some(now_iso());
        db.set_json(&user_key(id), &user)?;
        Ok::<_, ApiError>(user)
    })
}

/// Removes the account together with its posts and follow edges.
pub fn delete(db: &Db, id: &str) -> Result<(), ApiError> {
    db.exclusive(|| {
        let user = load_user(db, id)?;

        delete_posts_by(db, id)?;
        remove_all_edges(db, id)?;

        db.delete(&email_key(&user.email))?;
        db.delete(&nick_key(&user.nick))?;
        db.delete(&user_key(id))?;

        let mut users = db.get_list(USERS_LIST_KEY)?;
        users.retain(|existing| existing != id);
        db.set_json(USERS_LIST_KEY, &users)?;
        Ok::<_, ApiError>(())
    })?;

    tracing::info!(user_id = %id, "user deleted");
    Ok(())
}

/// Re-authenticates with `current`, then stores a hash of `new`.
pub fn change_password(db: &Db, identity: &Identity, change: &PasswordChange) -> Result<(), ApiError> {
    if change.new.is_empty() {
        return Err(ApiError::Validation("password is required".to_string()));
    }
    reauthenticate(db, identity, &change.current)?;
    let password = hash_password(&change.new)?;

    db.exclusive(|| {
        let mut user = load_user(db, identity.as_str())?;
        user.password = password;
        user.updated_at = Some(now_iso());
        db.set_json(&user_key(&user.id), &user)?;
        Ok::<_, ApiError>(())
    })?;

    tracing::info!(user_id = %identity, "password changed");
    Ok(())
}

impl CredentialStore for Db {
    fn password_hash(&self, identity: &Identity) -> Result<String, ApiError> {
        load_user(self, identity.as_str()).map(|user| user.password)
    }
}

fn user_id(raw: &str) -> Result<Identity, ApiError> {
    if !validate_uuid(raw) {
        return Err(ApiError::Validation("invalid user id".to_string()));
    }
    Ok(Identity::new(raw))
}

// === HTTP Handlers ===

pub fn create_user(state: &AppState, req: &Request) -> Result<Response, ApiError> {
    let candidate: NewUser = parse_body(req)?;
    let user = register(&state.db, candidate)?;
    json_response(StatusCode::CREATED, &UserProfile::from(&user))
}

pub fn search_users(state: &AppState, req: &Request) -> Result<Response, ApiError> {
    let params = parse_query_params(req.uri());
    let term = get_string(&params, "search", Some("")).unwrap_or_default();
    json_response(StatusCode::OK, &search(&state.db, &term)?)
}

pub fn get_user(state: &AppState, id: &str) -> Result<Response, ApiError> {
    let id = user_id(id)?;
    let user = load_user(&state.db, id.as_str())?;
    json_response(StatusCode::OK, &UserProfile::from(&user))
}

pub fn update_user(
    state: &AppState,
    req: &Request,
    identity: Identity,
    id: &str,
) -> Result<Response, ApiError> {
    let target = user_id(id)?;
    let changes = prepare(parse_body(req)?, Step::Edit)?;
    require_self(&identity, &target)?;

    update(&state.db, target.as_str(), changes)?;
    Ok(no_content())
}

pub fn delete_user(state: &AppState, identity: Identity, id: &str) -> Result<Response, ApiError> {
    let target = user_id(id)?;
    require_self(&identity, &target)?;

    delete(&state.db, target.as_str())?;
    Ok(no_content())
}

pub fn update_password(
    state: &AppState,
    req: &Request,
    identity: Identity,
    id: &str,
) -> Result<Response, ApiError> {
    let target = user_id(id)?;
    let change: PasswordChange = parse_body(req)?;
    require_self(&identity, &target)?;

    change_password(&state.db, &identity, &change)?;
    Ok(no_content())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ErrorKind;
    use crate::crypt::verify_password;

    fn candidate(name: &str, nick: &str, email: &str, password: &str) -> NewUser {
        NewUser {
            name: name.into(),
            nick: nick.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    fn validation_message(candidate: NewUser, step: Step) -> String {
        match validate(&normalize(candidate), step) {
            Err(ApiError::Validation(message)) => message,
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[test]
    fn validation_messages_are_exact() {
        let cases = [
            (candidate("", "n", "a@b.co", "p"), "username is required"),
            (candidate("ab", "n", "a@b.co", "p"), "username must have three or more characters"),
            (candidate("Ana 42", "n", "a@b.co", "p"), "username must have three or more characters"),
            (candidate("Ana", "  ", "a@b.co", "p"), "nick is required"),
            (candidate("Ana", "n", "", "p"), "email is required"),
            (candidate("Ana", "n", "not-an-email", "p"), "invalid email"),
            (candidate("Ana", "n", "a@b..co", "p"), "invalid email"),
            (candidate("Ana", "n", "a b@b.co", "p"), "invalid email"),
            (candidate("Ana", "n", "a@b.co", ""), "password is required"),
        ];
        for (input, expected) in cases {
            assert_eq!(validation_message(input, Step::Register), expected);
        }
    }

    #[test]
    fn editing_does_not_require_a_password() {
        assert!(validate(&candidate("Ana", "n", "a@b.co", ""), Step::Edit).is_ok());
    }

    #[test]
    fn single_label_email_domains_are_accepted() {
        assert!(validate(&candidate("Ana", "n", "ana@localhost", "p"), Step::Register).is_ok());
    }

    #[test]
    fn concurrent_registrations_are_all_listed() {
        let db = Db::memory();
        let threads: Vec<_> = (0..12)
            .map(|i| {
                let db = db.clone();
                std::thread::spawn(move || {
                    let nick = format!("user{}", i);
                    register(&db, candidate("Some Person", &nick, &format!("{}@example.com", nick), "pw"))
                        .unwrap()
                        .id
                })
            })
            .collect();
        let mut ids: Vec<String> = threads.into_iter().map(|t| t.join().unwrap()).collect();

        let mut listed = db.get_list(USERS_LIST_KEY).unwrap();
        ids.sort();
        listed.sort();
        assert_eq!(listed, ids);
        assert_eq!(search(&db, "person").unwrap().len(), 12);
    }

    #[test]
    fn concurrent_claims_on_one_email_admit_a_single_account() {
        let db = Db::memory();
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let db = db.clone();
                std::thread::spawn(move || {
                    register(&db, candidate("Some Person", &format!("n{}", i), "same@example.com", "pw"))
                        .is_ok()
                })
            })
            .collect();
        let admitted = threads
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(admitted, 1);
        assert_eq!(db.get_list(USERS_LIST_KEY).unwrap().len(), 1);
    }

    #[test]
    fn register_trims_hashes_and_indexes() {
        let db = Db::memory();
        let user = register(&db, candidate("  Ana Silva ", " ana ", " ana@example.com ", "pw")).unwrap();

        assert_eq!(user.name, "Ana Silva");
        assert_eq!(user.nick, "ana");
        assert!(verify_password(&user.password, "pw").is_ok());

        let found = find_by_email(&db, "ana@example.com").unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(db.get_list(USERS_LIST_KEY).unwrap(), vec![user.id]);
    }

    #[test]
    fn duplicate_email_or_nick_conflicts() {
        let db = Db::memory();
        register(&db, candidate("Ana", "ana", "ana@example.com", "pw")).unwrap();

        let same_email = register(&db, candidate("Bia", "bia", "ana@example.com", "pw"));
        assert_eq!(same_email.unwrap_err().kind(), ErrorKind::Conflict);

        let same_nick = register(&db, candidate("Bia", "ana", "bia@example.com", "pw"));
        assert_eq!(same_nick.unwrap_err().kind(), ErrorKind::Conflict);
    }

    #[test]
    fn search_matches_name_or_nick_ignoring_case() {
        let db = Db::memory();
        register(&db, candidate("Ana Silva", "anas", "ana@example.com", "pw")).unwrap();
        register(&db, candidate("Bruno", "brunao", "bruno@example.com", "pw")).unwrap();

        let names = |term: &str| -> Vec<String> {
            search(&db, term).unwrap().into_iter().map(|u| u.name).collect()
        };
        assert_eq!(names("SILVA"), vec!["Ana Silva"]);
        assert_eq!(names("brun"), vec!["Bruno"]);
        assert_eq!(names("").len(), 2);
        assert!(names("zzz").is_empty());
    }

    #[test]
    fn update_moves_the_indexes() {
        let db = Db::memory();
        let user = register(&db, candidate("Ana", "ana", "ana@example.com", "pw")).unwrap();

        let changes = prepare(candidate(" Ana Maria ", "anamaria", "am@example.com", ""), Step::Edit).unwrap();
        update(&db, &user.id, changes).unwrap();

        assert!(find_by_email(&db, "ana@example.com").unwrap().is_none());
        let moved = find_by_email(&db, "am@example.com").unwrap().unwrap();
        assert_eq!(moved.name, "Ana Maria");
        assert_eq!(moved.nick, "anamaria");
        assert!(moved.updated_at.is_some());

        // The freed nick can be taken again.
        register(&db, candidate("Other", "ana", "other@example.com", "pw")).unwrap();
    }

    #[test]
    fn password_change_requires_the_current_password() {
        let db = Db::memory();
        let user = register(&db, candidate("Ana", "ana", "ana@example.com", "old")).unwrap();
        let identity = Identity::new(user.id.clone());

        let wrong = PasswordChange { current: "guess".into(), new: "abc".into() };
        assert_eq!(
            change_password(&db, &identity, &wrong).unwrap_err().kind(),
            ErrorKind::WrongCredential
        );
        assert_eq!(load_user(&db, &user.id).unwrap().password, user.password);

        let right = PasswordChange { current: "old".into(), new: "abc".into() };
        change_password(&db, &identity, &right).unwrap();
        let hash = load_user(&db, &user.id).unwrap().password;
        assert!(verify_password(&hash, "abc").is_ok());
        assert!(verify_password(&hash, "old").is_err());
    }

    #[test]
    fn delete_frees_email_and_removes_the_account() {
        let db = Db::memory();
        let user = register(&db, candidate("Ana", "ana", "ana@example.com", "pw")).unwrap();

        delete(&db, &user.id).unwrap();

        assert_eq!(load_user(&db, &user.id).unwrap_err().kind(), ErrorKind::NotFound);
        assert!(find_by_email(&db, "ana@example.com").unwrap().is_none());
        assert!(db.get_list(USERS_LIST_KEY).unwrap().is_empty());
    }
}
