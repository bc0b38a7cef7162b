//! HTTP implementation of the remote change-log client.

use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteChangeClient;
use chrono::{DateTime, Utc};
use logsync_protocol::{headers, ChangeLogEntry, Operation};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::{StatusCode, Url};
use std::time::Duration;

/// Blocking HTTP client against the change-log server's wire protocol.
pub struct HttpRemoteClient {
    base_url: Url,
    api_token: Option<String>,
    client: Client,
}

impl HttpRemoteClient {
    /// Creates a client for the given server base URL.
    pub fn new(base_url: &str, api_token: Option<String>) -> SyncResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|err| SyncError::config(format!("invalid server host: {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::config("server host is not a valid base URL"));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| SyncError::network(err.to_string()))?;

        Ok(Self {
            base_url,
            api_token,
            client,
        })
    }

    /// Builds a URL from path segments, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> SyncResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| SyncError::config("server host cannot carry a path"))?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    fn with_token(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.header(headers::API_TOKEN, token),
            None => request,
        }
    }

    fn send(&self, request: RequestBuilder) -> SyncResult<reqwest::blocking::Response> {
        self.with_token(request)
            .send()
            .map_err(|err| SyncError::network(err.to_string()))
    }
}

impl RemoteChangeClient for HttpRemoteClient {
    fn changes(&self, graph: &str, since: DateTime<Utc>) -> SyncResult<Vec<ChangeLogEntry>> {
        let mut url = self.url(&[graph, "changes"])?;
        url.query_pairs_mut()
            .append_pair("since", &since.timestamp_millis().to_string());

        let response = self.send(self.client.get(url))?;
        if response.status() != StatusCode::OK {
            return Err(SyncError::status(response.status().as_u16()));
        }

        response
            .json::<Vec<ChangeLogEntry>>()
            .map_err(|err| SyncError::Protocol(format!("invalid changes response: {err}")))
    }

    fn content(&self, graph: &str, file_id: &str) -> SyncResult<Vec<u8>> {
        let url = self.url(&[graph, "content", file_id])?;

        let response = self.send(self.client.get(url))?;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(SyncError::NotFound(file_id.to_string())),
            status => return Err(SyncError::status(status.as_u16())),
        }

        let bytes = response
            .bytes()
            .map_err(|err| SyncError::network(err.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn upload(
        &self,
        graph: &str,
        transaction_id: &str,
        operation: Operation,
        file_id: &str,
        last_change: DateTime<Utc>,
        content: Vec<u8>,
    ) -> SyncResult<()> {
        let url = self.url(&[graph, "upload"])?;

        // Seconds precision, the coarsest of the two timestamp encodings;
        // a later delete for the same file reports millis and therefore
        // never collides with this entry's ledger identity.
        let modified = last_change.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let form = Form::new()
            .part("file", Part::bytes(content).file_name(file_id.to_string()))
            .text("ta-id", transaction_id.to_string())
            .text("operation", operation.as_code())
            .text("modified-date", modified);

        let response = self.send(self.client.post(url).multipart(form))?;
        if response.status() != StatusCode::CREATED {
            return Err(SyncError::status(response.status().as_u16()));
        }
        Ok(())
    }

    fn delete(
        &self,
        graph: &str,
        transaction_id: &str,
        file_id: &str,
        last_change: DateTime<Utc>,
    ) -> SyncResult<()> {
        let mut url = self.url(&[graph, "delete", file_id])?;
        url.query_pairs_mut()
            .append_pair("ta_id", transaction_id)
            .append_pair(
                "modified_date",
                &last_change.timestamp_millis().to_string(),
            );

        let response = self.send(self.client.delete(url))?;
        if response.status() != StatusCode::NO_CONTENT {
            return Err(SyncError::status(response.status().as_u16()));
        }
        Ok(())
    }
}
