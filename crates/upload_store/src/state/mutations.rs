use shared::{
    domain::{UploadRecord, User},
    error::ActionError,
};

use super::Snapshot;

/// A single write to the snapshot, as committed by the action layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    ReplaceUploads(Vec<UploadRecord>),
    AppendUpload(UploadRecord),
    SetUser(Option<User>),
    SetLoading(bool),
    SetError(ActionError),
    ClearError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    ReplaceUploads,
    AppendUpload,
    SetUser,
    SetLoading,
    SetError,
    ClearError,
}

impl Mutation {
    pub fn kind(&self) -> MutationKind {
        match self {
            Mutation::ReplaceUploads(_) => MutationKind::ReplaceUploads,
            Mutation::AppendUpload(_) => MutationKind::AppendUpload,
            Mutation::SetUser(_) => MutationKind::SetUser,
            Mutation::SetLoading(_) => MutationKind::SetLoading,
            Mutation::SetError(_) => MutationKind::SetError,
            Mutation::ClearError => MutationKind::ClearError,
        }
    }
}

impl Snapshot {
    pub fn apply(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::ReplaceUploads(uploads) => self.replace_uploads(uploads),
            Mutation::AppendUpload(upload) => self.append_upload(upload),
            Mutation::SetUser(user) => self.set_user(user),
            Mutation::SetLoading(loading) => self.set_loading(loading),
            Mutation::SetError(error) => self.set_error(error),
            Mutation::ClearError => self.clear_error(),
        }
    }

    pub fn replace_uploads(&mut self, uploads: Vec<UploadRecord>) {
        self.uploads = uploads;
    }

    /// Ids are not checked for duplicates; the datastore hands out unique keys.
    pub fn append_upload(&mut self, upload: UploadRecord) {
        self.uploads.push(upload);
    }

    pub fn set_user(&mut self, user: Option<User>) {
        self.user = user;
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn set_error(&mut self, error: ActionError) {
        self.error = Some(error);
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }
}
