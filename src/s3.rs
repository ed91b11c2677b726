//! S3 object storage for manual PDFs.
//!
//! Lists and downloads objects with the S3 REST API, signed with AWS
//! Signature V4 using only `hmac` and `sha2`. Custom endpoints (MinIO,
//! LocalStack) are addressed path-style: `{endpoint}/{bucket}/{key}`.
//! Otherwise requests go to `{bucket}.s3.{region}.amazonaws.com`.
//!
//! # Configuration
//!
//! ```toml
//! [storage]
//! kind = "s3"
//! bucket = "unimog-manuals"
//! prefix = "pdf/"
//! region = "eu-central-1"
//! # endpoint_url = "http://localhost:9000"   # MinIO
//! ```
//!
//! Credentials are read from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`
//! and optionally `AWS_SESSION_TOKEN`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use globset::GlobSet;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::config::S3StorageConfig;
use crate::object_store::{build_globset, ObjectInfo, ObjectStore, StorageError};

type HmacSha256 = Hmac<Sha256>;

/// AWS credentials.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl AwsCredentials {
    pub fn from_env() -> Result<Self, StorageError> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| StorageError::Config("AWS_ACCESS_KEY_ID environment variable not set".into()))?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").map_err(|_| {
            StorageError::Config("AWS_SECRET_ACCESS_KEY environment variable not set".into())
        })?;
        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token: std::env::var("AWS_SESSION_TOKEN").ok(),
        })
    }
}

/// Where requests for a bucket are sent.
struct Endpoint {
    /// `scheme://host[:port]`
    base: String,
    /// Value of the signed `host` header.
    host: String,
    /// Path prefix before the object key: `"/"` or `"/{bucket}/"`.
    path_prefix: String,
}

/// A signed GET ready to send.
struct SignedGet {
    url: String,
    headers: Vec<(String, String)>,
}

pub struct S3ObjectStore {
    config: S3StorageConfig,
    creds: AwsCredentials,
    include: GlobSet,
    client: reqwest::Client,
}

impl S3ObjectStore {
    pub fn new(config: S3StorageConfig, creds: AwsCredentials) -> Result<Self, StorageError> {
        let include = build_globset(&config.include_globs)?;
        Ok(Self {
            config,
            creds,
            include,
            client: reqwest::Client::new(),
        })
    }

    pub fn from_env(config: S3StorageConfig) -> Result<Self, StorageError> {
        Self::new(config, AwsCredentials::from_env()?)
    }

    fn endpoint(&self) -> Result<Endpoint, StorageError> {
        match self.config.endpoint_url {
            Some(ref endpoint) => {
                let url = url::Url::parse(endpoint).map_err(|e| {
                    StorageError::Config(format!("invalid endpoint_url '{}': {}", endpoint, e))
                })?;
                let host = match (url.host_str(), url.port()) {
                    (Some(h), Some(p)) => format!("{}:{}", h, p),
                    (Some(h), None) => h.to_string(),
                    (None, _) => {
                        return Err(StorageError::Config(format!(
                            "endpoint_url '{}' has no host",
                            endpoint
                        )))
                    }
                };
                Ok(Endpoint {
                    base: format!("{}://{}", url.scheme(), host),
                    host,
                    path_prefix: format!("/{}/", uri_encode(&self.config.bucket)),
                })
            }
            None => {
                let host = format!("{}.s3.{}.amazonaws.com", self.config.bucket, self.config.region);
                Ok(Endpoint {
                    base: format!("https://{}", host),
                    host,
                    path_prefix: "/".to_string(),
                })
            }
        }
    }

    /// Full object key for a store-relative name.
    fn object_key(&self, name: &str) -> String {
        let prefix = self.config.prefix.trim_end_matches('/');
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", prefix, name)
        }
    }

    /// Store-relative name for a full object key.
    fn relative_name(&self, key: &str) -> String {
        let prefix = self.config.prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return key.to_string();
        }
        key.strip_prefix(prefix)
            .map(|s| s.trim_start_matches('/').to_string())
            .unwrap_or_else(|| key.to_string())
    }

    fn sign_get(
        &self,
        encoded_key: &str,
        query: &[(String, String)],
        now: DateTime<Utc>,
    ) -> Result<SignedGet, StorageError> {
        let endpoint = self.endpoint()?;
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = hex_sha256(b"");

        let mut sorted_params = query.to_vec();
        sorted_params.sort();
        let canonical_querystring: String = sorted_params
            .iter()
            .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let mut headers = vec![
            ("host".to_string(), endpoint.host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(ref token) = self.creds.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort();

        let signed_headers = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_uri = format!("{}{}", endpoint.path_prefix, encoded_key);
        let canonical_request = format!(
            "GET\n{}\n{}\n{}\n{}\n{}",
            canonical_uri, canonical_querystring, canonical_headers, signed_headers, payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );
        let signing_key = derive_signing_key(
            &self.creds.secret_access_key,
            &date_stamp,
            &self.config.region,
            "s3",
        );
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.creds.access_key_id, credential_scope, signed_headers, signature
        );

        let mut url = format!("{}{}", endpoint.base, canonical_uri);
        if !canonical_querystring.is_empty() {
            url.push('?');
            url.push_str(&canonical_querystring);
        }

        // reqwest derives `host` from the URL
        let mut out: Vec<(String, String)> = headers.into_iter().filter(|(k, _)| k != "host").collect();
        out.push(("Authorization".to_string(), authorization));
        Ok(SignedGet { url, headers: out })
    }

    async fn send(&self, signed: SignedGet, what: &str) -> Result<reqwest::Response, StorageError> {
        let mut req = self.client.get(&signed.url);
        for (k, v) in &signed.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        let resp = req
            .send()
            .await
            .map_err(|e| StorageError::Http(format!("{}: {}", what, e)))?;

        match resp.status().as_u16() {
            200..=299 => Ok(resp),
            404 => Err(StorageError::NotFound(what.to_string())),
            401 | 403 => Err(StorageError::Access(format!(
                "{} (HTTP {})",
                what,
                resp.status()
            ))),
            _ => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                Err(StorageError::Http(format!(
                    "{} failed (HTTP {}): {}",
                    what,
                    status,
                    body.chars().take(500).collect::<String>()
                )))
            }
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn download(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let key = self.object_key(name);
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        let signed = self.sign_get(&encoded_key, &[], Utc::now())?;

        let resp = self
            .send(signed, &format!("s3://{}/{}", self.config.bucket, key))
            .await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| StorageError::Http(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn list(&self) -> Result<Vec<ObjectInfo>, StorageError> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("list-type".to_string(), "2".to_string()),
                ("max-keys".to_string(), "1000".to_string()),
            ];
            if !self.config.prefix.is_empty() {
                query.push(("prefix".to_string(), self.config.prefix.clone()));
            }
            if let Some(ref token) = continuation_token {
                query.push(("continuation-token".to_string(), token.clone()));
            }

            let signed = self.sign_get("", &query, Utc::now())?;
            let what = format!("ListObjectsV2 s3://{}/{}", self.config.bucket, self.config.prefix);
            let xml = self
                .send(signed, &what)
                .await?
                .text()
                .await
                .map_err(|e| StorageError::Http(e.to_string()))?;

            let page = parse_list_objects_response(&xml);
            for obj in page.objects {
                let name = self.relative_name(&obj.name);
                if self.include.is_match(&name) {
                    objects.push(ObjectInfo { name, ..obj });
                }
            }

            match (page.is_truncated, page.next_token) {
                (true, Some(token)) => continuation_token = Some(token),
                _ => break,
            }
        }

        objects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(objects)
    }
}

// ============ AWS SigV4 Helpers ============

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{}", secret_key).as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding; only `A-Z a-z 0-9 - _ . ~` pass through.
fn uri_encode(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => result.push_str(&format!("%{:02X}", byte)),
        }
    }
    result
}

// ============ ListObjectsV2 parsing ============

struct ListPage {
    objects: Vec<ObjectInfo>,
    is_truncated: bool,
    next_token: Option<String>,
}

fn parse_list_objects_response(xml: &str) -> ListPage {
    let mut objects = Vec::new();
    let is_truncated = extract_xml_value(xml, "IsTruncated").as_deref() == Some("true");
    let next_token = extract_xml_value(xml, "NextContinuationToken");

    let mut remaining = xml;
    while let Some(start) = remaining.find("<Contents>") {
        let block_start = start + "<Contents>".len();
        let Some(end) = remaining[block_start..].find("</Contents>") else {
            break;
        };
        let block = &remaining[block_start..block_start + end];
        remaining = &remaining[block_start + end + "</Contents>".len()..];

        let key = extract_xml_value(block, "Key").unwrap_or_default();
        if key.is_empty() || key.ends_with('/') {
            continue;
        }

        objects.push(ObjectInfo {
            name: key,
            size: extract_xml_value(block, "Size")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            last_modified: extract_xml_value(block, "LastModified")
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        });
    }

    ListPage {
        objects,
        is_truncated,
        next_token,
    }
}

fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let value_start = xml.find(&open)? + open.len();
    let end = xml[value_start..].find(&close)?;
    Some(xml[value_start..value_start + end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn store(endpoint: Option<&str>, prefix: &str) -> S3ObjectStore {
        S3ObjectStore::new(
            S3StorageConfig {
                bucket: "manuals".to_string(),
                prefix: prefix.to_string(),
                region: "eu-central-1".to_string(),
                endpoint_url: endpoint.map(str::to_string),
                include_globs: vec!["**/*.pdf".to_string()],
            },
            AwsCredentials {
                access_key_id: "AKIDEXAMPLE".to_string(),
                secret_access_key: "secret".to_string(),
                session_token: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn signing_key_matches_aws_reference() {
        let key = derive_signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn uri_encode_keeps_unreserved_only() {
        assert_eq!(uri_encode("G609 Manual (1).pdf"), "G609%20Manual%20%281%29.pdf");
        assert_eq!(uri_encode("a-b_c.d~e"), "a-b_c.d~e");
    }

    #[test]
    fn custom_endpoint_uses_path_style() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let signed = store(Some("http://localhost:9000"), "")
            .sign_get("g609.pdf", &[], now)
            .unwrap();
        assert_eq!(signed.url, "http://localhost:9000/manuals/g609.pdf");
        let auth = &signed.headers.iter().find(|(k, _)| k == "Authorization").unwrap().1;
        assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240501/eu-central-1/s3/aws4_request"));
        assert!(auth.contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date"));
    }

    #[test]
    fn default_endpoint_is_virtual_hosted() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let query = vec![("list-type".to_string(), "2".to_string())];
        let signed = store(None, "").sign_get("", &query, now).unwrap();
        assert_eq!(
            signed.url,
            "https://manuals.s3.eu-central-1.amazonaws.com/?list-type=2"
        );
    }

    #[test]
    fn prefix_is_stripped_from_names() {
        let s = store(None, "pdf/");
        assert_eq!(s.object_key("g609.pdf"), "pdf/g609.pdf");
        assert_eq!(s.relative_name("pdf/g609.pdf"), "g609.pdf");
    }

    #[test]
    fn list_response_skips_folders() {
        let xml = r#"<ListBucketResult>
            <IsTruncated>true</IsTruncated>
            <NextContinuationToken>tok</NextContinuationToken>
            <Contents><Key>pdf/</Key><Size>0</Size></Contents>
            <Contents><Key>pdf/g609.pdf</Key><Size>2048</Size>
              <LastModified>2024-01-02T03:04:05.000Z</LastModified></Contents>
        </ListBucketResult>"#;
        let page = parse_list_objects_response(xml);
        assert!(page.is_truncated);
        assert_eq!(page.next_token.as_deref(), Some("tok"));
        assert_eq!(page.objects.len(), 1);
        assert_eq!(page.objects[0].name, "pdf/g609.pdf");
        assert_eq!(page.objects[0].size, 2048);
        assert!(page.objects[0].last_modified.is_some());
    }
}
