//! Sample data for rehearsing a migration.
//!
//! Besides well-formed documents, the sample contains every legacy shape
//! the backfill corrects, so a `migrate` right after seeding has work to do.

use bson::{ Bson, Document };
use chrono::{ Duration, Utc };
use crate::{
    store::Store,
    bsn::serialize_document,
    error::{ Error, ErrorKind, Result, ResultExt },
};
use super::{ Doc, Feed, Notification, NotificationKind };

/// How many sample documents were written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedReport {
    /// Newly inserted.
    pub inserted: usize,
    /// Already present from an earlier seeding; left as they were.
    pub skipped: usize,
}

/// Serializes a typed document, stamped `minutes_ago`. Samples always carry
/// a fixed `_id`, which is what makes seeding repeatable.
fn stamped<T: Doc>(value: &T, minutes_ago: i64) -> Result<Document> {
    if value.id().is_none() {
        return Err(Error::new(ErrorKind::MissingDocumentField, "sample document has no `_id`"));
    }

    let mut document = serialize_document(value)?;
    let created_at = Utc::now() - Duration::minutes(minutes_ago);

    document.insert("createdAt", Bson::UtcDatetime(created_at));
    document.insert("updatedAt", Bson::UtcDatetime(created_at));

    Ok(document)
}

/// A sample post with a fixed `_id`.
fn feed(id: &str, user_id: &str, message: &str) -> Feed {
    Feed { id: Some(Bson::from(id)), ..Feed::new(user_id, message) }
}

/// A sample notification with a fixed `_id`.
fn notification(id: &str, sender_id: &str, receiver_id: &str, post_id: &str, kind: NotificationKind) -> Notification {
    Notification { id: Some(Bson::from(id)), ..Notification::new(sender_id, receiver_id, post_id, kind) }
}

/// Sample posts: one well-formed, then `likes` absent, `null`, and a string.
pub fn sample_feeds() -> Result<Vec<Document>> {
    let mut liked = feed("seed-feed-1", "u1", "Namaste from Bengaluru!");
    liked.image_ids = vec![String::from("img-001"), String::from("img-002")];
    liked.likes = vec![String::from("u2"), String::from("u3")];

    let mut without_likes = stamped(&feed("seed-feed-2", "u2", "First post"), 50)?;
    without_likes.remove("likes");

    let mut null_likes = stamped(&feed("seed-feed-3", "u3", "Monsoon is here"), 40)?;
    null_likes.insert("likes", Bson::Null);

    let mut string_likes = stamped(&feed("seed-feed-4", "u1", "Chai or coffee?"), 30)?;
    string_likes.insert("likes", "u2");

    Ok(vec![
        stamped(&liked, 60)?,
        without_likes,
        null_likes,
        string_likes,
    ])
}

/// Sample notifications: one of each kind, then `isRead` absent and ill-typed.
pub fn sample_notifications() -> Result<Vec<Document>> {
    let like = notification("seed-notification-1", "u2", "u1", "seed-feed-1", NotificationKind::Like);
    let comment = notification("seed-notification-2", "u3", "u1", "seed-feed-1", NotificationKind::Comment {
        comment_text: String::from("Beautiful!"),
    });
    let mut reply = notification("seed-notification-3", "u1", "u3", "seed-feed-1", NotificationKind::Reply {
        comment_text: String::from("Thank you!"),
        original_comment_text: String::from("Beautiful!"),
        comment_id: String::from("seed-comment-1"),
    });
    reply.is_read = true;

    let mut unread_unknown = stamped(
        &notification("seed-notification-4", "u3", "u2", "seed-feed-2", NotificationKind::Like), 20
    )?;
    unread_unknown.remove("isRead");

    let mut read_as_string = stamped(
        &notification("seed-notification-5", "u1", "u2", "seed-feed-2", NotificationKind::Like), 10
    )?;
    read_as_string.insert("isRead", "false");

    Ok(vec![
        stamped(&like, 55)?,
        stamped(&comment, 45)?,
        stamped(&reply, 35)?,
        unread_unknown,
        read_as_string,
    ])
}

/// Inserts the samples. Documents whose `_id` is already taken are skipped,
/// so seeding twice doesn't duplicate or overwrite anything.
pub fn seed(store: &dyn Store) -> Result<SeedReport> {
    let batches = vec![
        (Feed::NAME, sample_feeds()?),
        (Notification::NAME, sample_notifications()?),
    ];
    let mut report = SeedReport::default();

    for (collection, documents) in batches {
        for document in documents {
            match store.insert_one(collection, document) {
                Ok(()) => report.inserted += 1,
                Err(ref error) if error.is(ErrorKind::DuplicateKey) => report.skipped += 1,
                Err(error) => return Err(error).chain(|| format!("can't seed {}", collection)),
            }
        }
    }

    Ok(report)
}
