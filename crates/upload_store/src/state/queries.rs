use shared::{
    domain::{UploadId, UploadRecord, User},
    error::ActionError,
};

use super::Snapshot;

pub const FEATURED_UPLOAD_COUNT: usize = 5;

impl Snapshot {
    /// Uploads in arrival order; listing does not sort by date.
    pub fn all_uploads(&self) -> &[UploadRecord] {
        &self.uploads
    }

    pub fn featured_uploads(&self) -> &[UploadRecord] {
        let end = self.uploads.len().min(FEATURED_UPLOAD_COUNT);
        &self.uploads[..end]
    }

    pub fn upload_by_id(&self, id: &UploadId) -> Option<&UploadRecord> {
        self.uploads.iter().find(|upload| &upload.id == id)
    }

    pub fn current_user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn current_error(&self) -> Option<&ActionError> {
        self.error.as_ref()
    }
}
