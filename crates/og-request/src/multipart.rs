//! Multipart upload sessions
//!
//! A state machine that keeps up to N upload sessions in flight and, within
//! each, up to K part requests outstanding. One request is emitted per
//! `get()`: INITIATE while below the session target, then PART / COMPLETE
//! picked from the actionable sessions, waiting when nothing is actionable.
//!
//! Sessions are created when the INITIATE response arrives (the upload id
//! comes from its XML body), collect `(partNumber, ETag)` pairs as part
//! responses land, and emit COMPLETE only once every part has been observed
//! and nothing is outstanding. A failed initiate, part or complete abandons
//! the session.

use crate::single::{seed_for, SizeSupplier};
use crate::uri::{QueryParam, UriBuilder};
use crate::{now_ms, RequestSupplier};
use async_trait::async_trait;
use http::Method;
use og_common::config::{MultipartConfig, OperationChoice, TargetConfig};
use og_common::{
    Body, Context, ContextKey, Credential, DataType, Error, HttpRequest, HttpResponse, ObjectName,
    Operation, Result,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Mutex, Notify};
use tracing::warn;
use uuid::Uuid;

/// `x-og-multipart-request` values
pub mod phase {
    pub const INITIATE: &str = "initiate";
    pub const PART: &str = "part";
    pub const COMPLETE: &str = "complete";
    pub const ABORT: &str = "abort";
}

/// Marker for responses whose body must be retained for the supplier
pub const BODY_CONSUMER: &str = "s3.multipart";

/// INITIATE response body
#[derive(Debug, Deserialize)]
#[serde(rename = "InitiateMultipartUploadResult", rename_all = "PascalCase")]
struct InitiateMultipartUploadResult {
    upload_id: String,
}

/// COMPLETE request body
#[derive(Debug, Serialize)]
#[serde(rename = "CompleteMultipartUpload")]
struct CompleteMultipartUploadXml {
    #[serde(rename = "Part")]
    parts: Vec<CompletedPartXml>,
}

#[derive(Debug, Serialize)]
struct CompletedPartXml {
    #[serde(rename = "PartNumber")]
    part_number: u32,
    #[serde(rename = "ETag")]
    etag: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompleteState {
    None,
    InProgress,
    Done,
}

/// What a session can do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Part,
    Complete,
    /// Waiting on outstanding responses; nothing to emit
    Pending,
}

/// One in-flight upload session
#[derive(Debug)]
struct Session {
    upload_id: String,
    object: ObjectName,
    object_size: u64,
    part_size: u64,
    last_part_size: u64,
    total_parts: u32,
    next_part_number: u32,
    in_progress_parts: u32,
    finished_parts: u32,
    max_concurrent_parts: u32,
    complete_state: CompleteState,
    /// `(partNumber, ETag)` ordered by part number
    parts: BinaryHeap<Reverse<(u32, String)>>,
}

impl Session {
    fn new(
        upload_id: String,
        object: ObjectName,
        object_size: u64,
        part_size: u64,
        max_concurrent_parts: u32,
    ) -> Self {
        let total_parts = (object_size.div_ceil(part_size)).max(1) as u32;
        let last_part_size = if object_size == 0 {
            0
        } else if object_size % part_size == 0 {
            part_size
        } else {
            object_size % part_size
        };
        Self {
            upload_id,
            object,
            object_size,
            part_size,
            last_part_size,
            total_parts,
            next_part_number: 1,
            in_progress_parts: 0,
            finished_parts: 0,
            max_concurrent_parts,
            complete_state: CompleteState::None,
            parts: BinaryHeap::new(),
        }
    }

    fn next_action(&self) -> Action {
        if self.complete_state == CompleteState::None
            && self.finished_parts == self.total_parts
            && self.in_progress_parts == 0
        {
            return Action::Complete;
        }
        if self.complete_state == CompleteState::None
            && self.next_part_number <= self.total_parts
            && self.in_progress_parts < self.max_concurrent_parts
        {
            return Action::Part;
        }
        Action::Pending
    }

    fn size_of_part(&self, part_number: u32) -> u64 {
        if part_number == self.total_parts {
            self.last_part_size
        } else {
            self.part_size
        }
    }

    /// Drain collected parts in part-number order
    fn drain_parts(&mut self) -> Vec<(u32, String)> {
        let mut ordered = Vec::with_capacity(self.parts.len());
        while let Some(Reverse(entry)) = self.parts.pop() {
            ordered.push(entry);
        }
        ordered
    }
}

#[derive(Debug, Default)]
struct MultipartState {
    active_sessions: usize,
    sessions: HashMap<String, Session>,
    /// Upload ids whose session can emit a request right now
    actionable: Vec<String>,
}

impl MultipartState {
    fn admit(&mut self, upload_id: &str) {
        if !self.actionable.iter().any(|id| id == upload_id) {
            self.actionable.push(upload_id.to_string());
        }
    }

    fn evict(&mut self, upload_id: &str) {
        self.actionable.retain(|id| id != upload_id);
    }
}

/// Produces multipart upload requests under a target-sessions cap
pub struct MultipartSupplier {
    container: String,
    credential: Credential,
    uri: UriBuilder,
    data: DataType,
    part_size: u64,
    target_sessions: usize,
    max_concurrent_parts: u32,
    size: parking_lot::Mutex<SizeSupplier>,
    state: Mutex<MultipartState>,
    notify: Notify,
    stopped: AtomicBool,
    completed_sessions: AtomicU64,
    aborted_sessions: AtomicU64,
}

impl MultipartSupplier {
    pub fn new(
        multipart: &MultipartConfig,
        choice: &OperationChoice,
        target: &TargetConfig,
        credential: Credential,
    ) -> Result<Self> {
        Ok(Self {
            container: target.container.clone(),
            credential,
            uri: UriBuilder::new(target),
            data: choice.data,
            part_size: multipart.part_size,
            target_sessions: multipart.target_sessions,
            max_concurrent_parts: multipart.max_concurrent_parts,
            size: parking_lot::Mutex::new(SizeSupplier::new(choice.object_size)?),
            state: Mutex::new(MultipartState::default()),
            notify: Notify::new(),
            stopped: AtomicBool::new(false),
            completed_sessions: AtomicU64::new(0),
            aborted_sessions: AtomicU64::new(0),
        })
    }

    /// Sessions that finished with a successful COMPLETE
    pub fn completed(&self) -> u64 {
        self.completed_sessions.load(Ordering::Relaxed)
    }

    /// Sessions abandoned on a failed initiate, part or complete
    pub fn aborted(&self) -> u64 {
        self.aborted_sessions.load(Ordering::Relaxed)
    }

    /// Feed a request/response pair back into the state machine
    ///
    /// Wired as an event listener in the driver; non-multipart responses are
    /// ignored.
    pub async fn handle_response(&self, response: &HttpResponse) -> Result<()> {
        let Some(phase) = response.context.get(ContextKey::MultipartRequest) else {
            return Ok(());
        };
        match phase {
            phase::INITIATE => self.handle_initiate(response).await,
            phase::PART => self.handle_part(response).await,
            phase::COMPLETE => self.handle_complete(response).await,
            phase::ABORT => self.handle_abort(response).await,
            other => {
                warn!(phase = other, "unrecognized multipart phase in response");
                Ok(())
            }
        }
    }

    async fn handle_initiate(&self, response: &HttpResponse) -> Result<()> {
        let mut state = self.state.lock().await;
        if !response.is_success() {
            state.active_sessions = state.active_sessions.saturating_sub(1);
            self.aborted_sessions.fetch_add(1, Ordering::Relaxed);
            self.notify.notify_one();
            return Ok(());
        }

        let upload_id = match parse_upload_id(&response.body) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "initiate response body unusable, abandoning session");
                state.active_sessions = state.active_sessions.saturating_sub(1);
                self.aborted_sessions.fetch_add(1, Ordering::Relaxed);
                self.notify.notify_one();
                return Ok(());
            }
        };

        let ctx = &response.context;
        let object = ctx
            .get(ContextKey::ObjectName)
            .and_then(ObjectName::from_hex)
            .ok_or_else(|| Error::internal("initiate response lost its object name"))?;
        let object_size = ctx
            .get_u64(ContextKey::ObjectSize)
            .ok_or_else(|| Error::internal("initiate response lost its object size"))?;
        let part_size = ctx
            .get_u64(ContextKey::MultipartPartSize)
            .unwrap_or(self.part_size);
        let max_parts = ctx
            .get_u64(ContextKey::MultipartMaxParts)
            .unwrap_or(self.max_concurrent_parts as u64) as u32;

        let session = Session::new(upload_id.clone(), object, object_size, part_size, max_parts);
        state.sessions.insert(upload_id.clone(), session);
        state.admit(&upload_id);
        self.notify.notify_one();
        Ok(())
    }

    async fn handle_part(&self, response: &HttpResponse) -> Result<()> {
        let ctx = &response.context;
        let Some(upload_id) = ctx.get(ContextKey::MultipartUploadId).map(str::to_string) else {
            return Ok(());
        };
        let part_number = ctx.get_u64(ContextKey::MultipartPartNumber).unwrap_or(0) as u32;

        let mut state = self.state.lock().await;
        let Some(session) = state.sessions.get_mut(&upload_id) else {
            // Session already abandoned; nothing left to account.
            return Ok(());
        };
        session.in_progress_parts = session.in_progress_parts.saturating_sub(1);

        let etag = response.header("etag");
        if response.is_success() && etag.is_some() {
            // The ETag is stored verbatim, quoted or not.
            let etag = etag.expect("checked above").to_string();
            session.parts.push(Reverse((part_number, etag)));
            session.finished_parts += 1;
            if session.next_action() != Action::Pending {
                state.admit(&upload_id);
            }
        } else {
            warn!(
                upload_id = %upload_id,
                part_number,
                status = response.status_code,
                "part failed, abandoning session"
            );
            state.sessions.remove(&upload_id);
            state.evict(&upload_id);
            state.active_sessions = state.active_sessions.saturating_sub(1);
            self.aborted_sessions.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn handle_complete(&self, response: &HttpResponse) -> Result<()> {
        let ctx = &response.context;
        let Some(upload_id) = ctx.get(ContextKey::MultipartUploadId).map(str::to_string) else {
            return Ok(());
        };

        let mut state = self.state.lock().await;
        if let Some(mut session) = state.sessions.remove(&upload_id) {
            session.complete_state = CompleteState::Done;
            state.evict(&upload_id);
            state.active_sessions = state.active_sessions.saturating_sub(1);
            if response.is_success() {
                self.completed_sessions.fetch_add(1, Ordering::Relaxed);
            } else {
                self.aborted_sessions.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Abort responses only occur once a trigger policy emits ABORT
    /// requests; the bookkeeping mirrors an abandoned session.
    async fn handle_abort(&self, response: &HttpResponse) -> Result<()> {
        let ctx = &response.context;
        let Some(upload_id) = ctx.get(ContextKey::MultipartUploadId).map(str::to_string) else {
            return Ok(());
        };
        let mut state = self.state.lock().await;
        if state.sessions.remove(&upload_id).is_some() {
            state.evict(&upload_id);
            state.active_sessions = state.active_sessions.saturating_sub(1);
            self.aborted_sessions.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        Ok(())
    }

    fn base_context(&self) -> Context {
        let mut ctx = Context::new();
        ctx.set(ContextKey::ContainerName, self.container.clone());
        ctx.set(ContextKey::MultipartContainer, self.container.clone());
        ctx.set(ContextKey::Username, self.credential.username.clone());
        ctx.set(ContextKey::Password, self.credential.password.clone());
        ctx.set(ContextKey::RequestId, Uuid::new_v4().to_string());
        ctx
    }

    fn initiate_request(&self) -> Result<HttpRequest> {
        let object = ObjectName::random();
        let object_size = self.size.lock().get();

        let uri = self.uri.build(
            None,
            Some(&self.container),
            Some(&object.to_string()),
            &[("uploads".to_string(), None)] as &[QueryParam],
        )?;
        let mut request =
            HttpRequest::new(Method::POST, uri, Operation::MultipartWrite, now_ms());

        let mut ctx = self.base_context();
        ctx.set(ContextKey::MultipartRequest, phase::INITIATE);
        ctx.set(ContextKey::ObjectName, object.to_string());
        ctx.set(ContextKey::ObjectSize, object_size.to_string());
        ctx.set(ContextKey::MultipartPartSize, self.part_size.to_string());
        ctx.set(
            ContextKey::MultipartMaxParts,
            self.max_concurrent_parts.to_string(),
        );
        ctx.set(ContextKey::MultipartBodyDataType, self.data.as_str());
        ctx.set(ContextKey::ResponseBodyConsumer, BODY_CONSUMER);
        request.context = ctx;
        Ok(request)
    }

    fn part_request(
        &self,
        object: ObjectName,
        upload_id: &str,
        part_number: u32,
        part_size: u64,
    ) -> Result<HttpRequest> {
        let uri = self.uri.build(
            None,
            Some(&self.container),
            Some(&object.to_string()),
            &[
                ("partNumber".to_string(), Some(part_number.to_string())),
                ("uploadId".to_string(), Some(upload_id.to_string())),
            ],
        )?;
        let mut request = HttpRequest::new(Method::PUT, uri, Operation::MultipartWrite, now_ms());

        request.body = match self.data {
            DataType::Zeroes => Body::zeroes(part_size),
            DataType::None => Body::none(),
            // Each part gets its own stream so retried parts re-send the
            // same bytes.
            _ => Body::random(part_size, seed_for(object).wrapping_add(part_number as u64)),
        };

        let mut ctx = self.base_context();
        ctx.set(ContextKey::MultipartRequest, phase::PART);
        ctx.set(ContextKey::ObjectName, object.to_string());
        ctx.set(ContextKey::MultipartUploadId, upload_id.to_string());
        ctx.set(ContextKey::MultipartPartNumber, part_number.to_string());
        ctx.set(ContextKey::MultipartPartSize, part_size.to_string());
        request.context = ctx;
        Ok(request)
    }

    fn complete_request(
        &self,
        object: ObjectName,
        object_size: u64,
        upload_id: &str,
        parts: Vec<(u32, String)>,
    ) -> Result<HttpRequest> {
        let xml = CompleteMultipartUploadXml {
            parts: parts
                .into_iter()
                .map(|(part_number, etag)| CompletedPartXml { part_number, etag })
                .collect(),
        };
        let body = quick_xml::se::to_string(&xml)
            .map_err(|e| Error::internal(format!("complete body encode: {e}")))?;

        let uri = self.uri.build(
            None,
            Some(&self.container),
            Some(&object.to_string()),
            &[("uploadId".to_string(), Some(upload_id.to_string()))],
        )?;
        let mut request = HttpRequest::new(Method::POST, uri, Operation::MultipartWrite, now_ms());
        request.body = Body::custom(body.into_bytes());

        let mut ctx = self.base_context();
        ctx.set(ContextKey::MultipartRequest, phase::COMPLETE);
        ctx.set(ContextKey::ObjectName, object.to_string());
        ctx.set(ContextKey::ObjectSize, object_size.to_string());
        ctx.set(ContextKey::MultipartUploadId, upload_id.to_string());
        request.context = ctx;
        Ok(request)
    }
}

fn parse_upload_id(body: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(body).map_err(|_| Error::MissingUploadId)?;
    let parsed: InitiateMultipartUploadResult =
        quick_xml::de::from_str(text).map_err(|_| Error::MissingUploadId)?;
    if parsed.upload_id.is_empty() {
        return Err(Error::MissingUploadId);
    }
    Ok(parsed.upload_id)
}

#[async_trait]
impl RequestSupplier for MultipartSupplier {
    async fn get(&self) -> Result<HttpRequest> {
        loop {
            {
                let mut state = self.state.lock().await;
                if self.stopped.load(Ordering::Acquire) {
                    return Err(Error::Stopped);
                }

                if state.active_sessions < self.target_sessions {
                    state.active_sessions += 1;
                    return self.initiate_request();
                }

                // Pick an actionable session uniformly at random; sessions
                // that turn out to be pending drop out until a response
                // re-admits them.
                while !state.actionable.is_empty() {
                    let idx = rand::thread_rng().gen_range(0..state.actionable.len());
                    let upload_id = state.actionable[idx].clone();
                    let Some(session) = state.sessions.get_mut(&upload_id) else {
                        state.actionable.swap_remove(idx);
                        continue;
                    };

                    match session.next_action() {
                        Action::Part => {
                            let upload_id = session.upload_id.clone();
                            let part_number = session.next_part_number;
                            let part_size = session.size_of_part(part_number);
                            let object = session.object;
                            session.in_progress_parts += 1;
                            session.next_part_number += 1;
                            let exhausted = session.next_action() != Action::Part;
                            if exhausted {
                                state.actionable.swap_remove(idx);
                            }
                            return self.part_request(object, &upload_id, part_number, part_size);
                        }
                        Action::Complete => {
                            session.complete_state = CompleteState::InProgress;
                            let upload_id = session.upload_id.clone();
                            let object = session.object;
                            let object_size = session.object_size;
                            let parts = session.drain_parts();
                            state.actionable.swap_remove(idx);
                            return self.complete_request(object, object_size, &upload_id, parts);
                        }
                        Action::Pending => {
                            state.actionable.swap_remove(idx);
                        }
                    }
                }
            }
            self.notify.notified().await;
        }
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}
