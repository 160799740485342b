use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, Object};
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use http::Uri;
use serde::Deserialize;

use stowage_core::listing::{is_folder_marker, DELIMITER};
use stowage_core::{
    CompletedPart as UploadedPart, FileEntry, FlatListing, Listing, MultipartStore,
    ObjectCatalog, ObjectLocation, SessionId, UploadTarget,
};

pub(crate) mod logging;
use super::errors::{Error, Result};
use super::s3::logging::LoggingInterceptor;

/// Keys requested per page when enumerating a prefix.
const LIST_PAGE_SIZE: i32 = 1000;

#[derive(Clone, Deserialize)]
pub struct S3Config {
    secret_key: String,
    access_key: String,
    hostname: String,
    bucket_name: String,
    region: String,
    /// Address the bucket as `https://<hostname>/<bucket>` rather than as a subdomain. Needed by
    /// most S3-compatible stores.
    #[serde(default)]
    force_path_style: bool,
}

impl S3Config {
    pub async fn new_objects(&self) -> Result<S3> {
        let credentials = Credentials::new(
            self.access_key.clone(),
            self.secret_key.clone(),
            None,
            None,
            "stowage",
        );

        let uri = Uri::builder()
            .scheme("https")
            .authority(self.hostname.as_str())
            .path_and_query("/")
            .build()?;

        let sdk_config = aws_config::defaults(BehaviorVersion::latest()).load().await;

        let config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .region(Region::new(self.region.clone()))
            .credentials_provider(credentials)
            .endpoint_url(uri.to_string())
            .force_path_style(self.force_path_style)
            .interceptor(LoggingInterceptor)
            .build();

        let s3_client = aws_sdk_s3::Client::from_conf(config);

        Ok(S3 {
            bucket_name: self.bucket_name.clone(),
            client: s3_client,
        })
    }
}

#[derive(Clone)]
pub struct S3 {
    bucket_name: String,
    client: Client,
}

fn file_entry(object: &Object) -> Option<FileEntry> {
    let key = object.key()?;
    let last_modified = object
        .last_modified()
        .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.secs(), dt.subsec_nanos()));
    Some(FileEntry {
        key: key.to_string(),
        size: object.size().unwrap_or_default().max(0) as u64,
        last_modified,
    })
}

impl S3 {
    async fn list_one_level(&self, prefix: &str) -> Result<Listing> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket_name)
            .prefix(prefix)
            .delimiter(DELIMITER.to_string())
            .send()
            .await?;

        let files = output
            .contents()
            .iter()
            .filter(|o| {
                o.key()
                    .map(|k| k != prefix && !is_folder_marker(k))
                    .unwrap_or(false)
            })
            .filter_map(file_entry)
            .collect();
        let folders = output
            .common_prefixes()
            .iter()
            .filter_map(|cp| cp.prefix().map(String::from))
            .collect();

        Ok(Listing { folders, files })
    }

    async fn list_all(&self, prefix: &str) -> Result<FlatListing> {
        let mut files = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket_name)
                .prefix(prefix)
                .max_keys(LIST_PAGE_SIZE)
                .set_continuation_token(continuation_token.take())
                .send()
                .await?;

            files.extend(
                output
                    .contents()
                    .iter()
                    .filter(|o| o.key().map(|k| !is_folder_marker(k)).unwrap_or(false))
                    .filter_map(file_entry),
            );

            match (output.is_truncated(), output.next_continuation_token()) {
                (Some(true), Some(token)) => continuation_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(FlatListing { files })
    }
}

#[async_trait]
impl MultipartStore for S3 {
    async fn initiate(&self, key: &str, content_type: &str) -> stowage_core::Result<SessionId> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket_name)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(Error::from)?;

        let upload_id = output
            .upload_id()
            .ok_or(Error::FailedToInitiateMultipartUpload("missing upload id"))?;

        Ok(SessionId::new(upload_id))
    }

    async fn authorize_part(
        &self,
        key: &str,
        session: &SessionId,
        part_number: u32,
        expires_in: Duration,
    ) -> stowage_core::Result<UploadTarget> {
        let presigning = PresigningConfig::expires_in(expires_in).map_err(Error::from)?;
        let request = self
            .client
            .upload_part()
            .bucket(&self.bucket_name)
            .key(key)
            .upload_id(session.as_str())
            .part_number(part_number as i32)
            .presigned(presigning)
            .await
            .map_err(Error::from)?;

        Ok(UploadTarget {
            url: request.uri().to_string(),
            expires_in,
        })
    }

    async fn complete(
        &self,
        key: &str,
        session: &SessionId,
        parts: &[UploadedPart],
    ) -> stowage_core::Result<ObjectLocation> {
        let completed = parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .e_tag(p.e_tag.as_str())
                    .part_number(p.part_number as i32)
                    .build()
            })
            .collect();

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket_name)
            .key(key)
            .upload_id(session.as_str())
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(Error::from)?;

        let location = output
            .location()
            .map(String::from)
            .unwrap_or_else(|| format!("{}/{}", self.bucket_name, key));
        Ok(ObjectLocation::new(location))
    }

    async fn abort(&self, key: &str, session: &SessionId) -> stowage_core::Result<()> {
        match self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket_name)
            .key(key)
            .upload_id(session.as_str())
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .map(|se| se.is_no_such_upload())
                    .unwrap_or(false) =>
            {
                tracing::debug!(key, %session, "abort of unknown upload, nothing to release");
                Ok(())
            }
            Err(e) => Err(Error::from(e).into()),
        }
    }
}

#[async_trait]
impl ObjectCatalog for S3 {
    async fn list(&self, prefix: &str) -> stowage_core::Result<Listing> {
        Ok(self.list_one_level(prefix).await?)
    }

    async fn list_flat(&self, prefix: &str) -> stowage_core::Result<FlatListing> {
        Ok(self.list_all(prefix).await?)
    }

    async fn put_folder_marker(&self, key: &str) -> stowage_core::Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .content_length(0)
            .body(ByteStream::from_static(b""))
            .send()
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn presign_download(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> stowage_core::Result<String> {
        let presigning = PresigningConfig::expires_in(expires_in).map_err(Error::from)?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .response_content_disposition("attachment")
            .presigned(presigning)
            .await
            .map_err(Error::from)?;
        Ok(request.uri().to_string())
    }
}
