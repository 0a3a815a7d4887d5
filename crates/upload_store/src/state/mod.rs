//! In-memory snapshot of everything the application shows. Fields are private
//! to this module tree: `mutations` is the only writer, `queries` the readers.

use shared::{
    domain::{UploadRecord, User},
    error::ActionError,
};

mod mutations;
mod queries;

pub use mutations::{Mutation, MutationKind};
pub use queries::FEATURED_UPLOAD_COUNT;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    uploads: Vec<UploadRecord>,
    user: Option<User>,
    loading: bool,
    error: Option<ActionError>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
pub(crate) fn sample_record(id: &str) -> UploadRecord {
    UploadRecord {
        id: id.into(),
        kind: "photo".to_string(),
        description: format!("upload {id}"),
        filename: format!("{id}.png"),
        date: "2024-01-01T00:00:00Z".parse().expect("timestamp"),
        image_url: Some(format!("https://host/{id}.png")),
    }
}
