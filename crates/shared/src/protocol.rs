use serde::{Deserialize, Serialize};

use crate::{
    domain::{NewUpload, UploadId, UploadRecord},
    timestamp,
};

/// Upload record as stored in the remote datastore, keyed by its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadBody {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl UploadBody {
    pub fn from_new_upload(upload: &NewUpload) -> Self {
        Self {
            kind: upload.kind.clone(),
            date: timestamp::format(&upload.date),
            filename: upload.image.name.clone(),
            description: upload.description.clone(),
            image_url: None,
        }
    }

    pub fn into_record(self, id: UploadId) -> Result<UploadRecord, chrono::ParseError> {
        Ok(UploadRecord {
            id,
            kind: self.kind,
            description: self.description,
            filename: self.filename,
            date: timestamp::parse(&self.date)?,
            image_url: self.image_url,
        })
    }
}

/// Partial update applied once the stored object's address is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageUrlPatch {
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: String,
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use crate::domain::ImageBlob;

    #[test]
    fn new_upload_body_carries_blob_name_and_millis_date() {
        let upload = NewUpload {
            kind: "photo".into(),
            description: "x".into(),
            date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            image: ImageBlob::new("a.png", vec![1, 2, 3]),
        };

        let value = serde_json::to_value(UploadBody::from_new_upload(&upload)).expect("json");
        assert_eq!(
            value,
            json!({
                "type": "photo",
                "date": "2024-01-01T00:00:00.000Z",
                "filename": "a.png",
                "description": "x",
            })
        );
    }

    #[test]
    fn stored_body_without_image_url_keeps_it_absent() {
        let body: UploadBody = serde_json::from_value(json!({
            "type": "doc",
            "date": "2023-05-06T07:08:09.000Z",
            "filename": "b.pdf",
        }))
        .expect("body");

        let record = body.into_record(UploadId::from("k2")).expect("record");
        assert_eq!(record.description, "");
        assert_eq!(record.image_url, None);
        assert_eq!(record.id.as_str(), "k2");
    }

    #[test]
    fn image_url_patch_uses_camel_case_key() {
        let value = serde_json::to_value(ImageUrlPatch {
            image_url: "https://host/a.png".into(),
        })
        .expect("json");
        assert_eq!(value, json!({ "imageUrl": "https://host/a.png" }));
    }
}
