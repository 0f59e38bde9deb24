use async_trait::async_trait;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use http::Uri;
use serde::Deserialize;

use super::{Chunk, Key, ObjectDescriptor};

pub(crate) mod logging;
use super::errors::{Error, Result};
use super::s3::logging::LoggingInterceptor;
use super::ObjectStore;

fn default_scheme() -> String {
    String::from("https")
}

#[derive(Clone, Deserialize)]
pub struct S3Config {
    secret_key: String,
    access_key: String,
    hostname: String,
    bucket_name: String,
    region: String,
    #[serde(default = "default_scheme")]
    scheme: String,
    #[serde(default)]
    force_path_style: bool,
}

impl S3Config {
    pub async fn new_objects(&self) -> Result<S3> {
        let scp = SharedCredentialsProvider::new(
            Credentials::new(
                self.access_key.clone(),
                self.secret_key.clone(),
                None,
                None,
                "parcel",
            )
            .provide_credentials()
            .await?,
        );

        let uri = Uri::builder()
            .scheme(self.scheme.as_str())
            .authority(self.hostname.as_str())
            .path_and_query("/")
            .build()?;

        let sdk_config = aws_config::load_from_env().await;

        let config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .region(Region::new(self.region.clone()))
            .credentials_provider(scp)
            .endpoint_url(uri.to_string())
            .force_path_style(self.force_path_style)
            .interceptor(LoggingInterceptor)
            .build();

        let s3_client = aws_sdk_s3::Client::from_conf(config);

        tracing::debug!(
            "configured s3 object store for bucket {} at {uri}",
            self.bucket_name
        );

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

#[async_trait]
impl ObjectStore for S3 {
    async fn initiate_multipart_upload(&self, key: &Key, content_type: &str) -> Result<String> {
        let create_multipart_upload_output = self
            .client
            .create_multipart_upload()
            .key(String::from(key))
            .content_type(content_type)
            .bucket(&self.bucket_name)
            .send()
            .await?;

        create_multipart_upload_output
            .upload_id
            .ok_or(Error::ObjectsFailedToInitiateMultipartUpload(
                "missing upload id",
            ))
    }

    async fn upload_part(
        &self,
        upload_id: &str,
        key: &Key,
        part_number: i32,
        body: Bytes,
    ) -> Result<Chunk> {
        let content_length = body.len() as i64;
        let upload_part_output = self
            .client
            .upload_part()
            .upload_id(upload_id)
            .part_number(part_number)
            .key(String::from(key))
            .body(ByteStream::from(body))
            .content_length(content_length)
            .bucket(&self.bucket_name)
            .send()
            .await?;

        Ok(Chunk {
            e_tag: upload_part_output.e_tag,
            chunk_number: part_number,
        })
    }

    async fn complete_multipart_upload(
        &self,
        upload_id: &str,
        key: &Key,
        chunks: Vec<Chunk>,
    ) -> Result<ObjectDescriptor> {
        let mut mpu = CompletedMultipartUpload::builder();
        for chunk in chunks {
            let mut pb = CompletedPart::builder();
            if let Some(e_tag) = &chunk.e_tag {
                pb = pb.e_tag(e_tag);
            }
            mpu = mpu.parts(pb.part_number(chunk.chunk_number).build());
        }
        let complete_multipart_upload_output = self
            .client
            .complete_multipart_upload()
            .multipart_upload(mpu.build())
            .upload_id(upload_id)
            .key(String::from(key))
            .bucket(&self.bucket_name)
            .send()
            .await?;

        Ok(ObjectDescriptor {
            key: String::from(key),
            e_tag: complete_multipart_upload_output.e_tag,
            location: complete_multipart_upload_output.location,
            version_id: complete_multipart_upload_output.version_id,
        })
    }

    async fn abort_multipart_upload(&self, upload_id: &str, key: &Key) -> Result<()> {
        let _abort_multipart_upload_output = self
            .client
            .abort_multipart_upload()
            .upload_id(upload_id)
            .key(String::from(key))
            .bucket(&self.bucket_name)
            .send()
            .await?;
        // TODO: list parts after abort to catch parts that were still in flight when the abort
        // landed; the SDK docs suggest an abort can race with a concurrent part upload.

        Ok(())
    }
}
