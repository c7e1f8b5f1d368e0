//! Document helpers shared by the store facade and drivers

use bson::oid::ObjectId;
use bson::{Bson, Document, doc};

use crate::{DocPoolError, Result};

const ID_FIELD: &str = "_id";

/// Reject update documents that mix operators (`$set`, `$inc`, ...) with
/// plain fields, since the store would refuse them anyway.
pub fn check_update(update: &Document) -> Result<()> {
    let operators = update.keys().filter(|key| key.starts_with('$')).count();
    if operators != 0 && operators != update.len() {
        return Err(DocPoolError::Argument(
            "update document mixes update operators with plain fields".into(),
        ));
    }
    Ok(())
}

/// Turn a plain field document into a `$set` update.
///
/// Documents that already consist of update operators pass through.
pub fn normalize_update(update: Document) -> Result<Document> {
    check_update(&update)?;
    if update.keys().next().is_some_and(|key| key.starts_with('$')) {
        Ok(update)
    } else {
        Ok(doc! { "$set": update })
    }
}

/// Give a document without an `_id` a fresh ObjectId and return its id.
///
/// Inserts carry their id from the first attempt, so a retried insert whose
/// first attempt was applied fails as a duplicate instead of writing twice.
pub fn ensure_id(document: &mut Document) -> Bson {
    if let Some(id) = document.get(ID_FIELD) {
        return id.clone();
    }
    let id = Bson::ObjectId(ObjectId::new());
    document.insert(ID_FIELD, id.clone());
    id
}

/// Replace a hex string `_id` in a filter with the matching ObjectId.
///
/// Non-string ids are left alone; a string that is not a valid 24 digit hex
/// ObjectId is an argument error.
pub fn coerce_hex_id(filter: &mut Document) -> Result<()> {
    let Some(Bson::String(hex)) = filter.get(ID_FIELD) else {
        return Ok(());
    };
    if hex.is_empty() {
        return Ok(());
    }
    let oid = ObjectId::parse_str(hex).map_err(|e| {
        DocPoolError::Argument(format!("`_id` value `{}` is not an ObjectId: {}", hex, e))
    })?;
    filter.insert(ID_FIELD, oid);
    Ok(())
}

/// Render an ObjectId `_id` as its hex string
pub fn render_hex_id(document: &mut Document) {
    if let Some(Bson::ObjectId(oid)) = document.get(ID_FIELD) {
        let hex = oid.to_hex();
        document.insert(ID_FIELD, hex);
    }
}
