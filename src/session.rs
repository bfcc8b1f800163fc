use crate::catalog::FormatCatalog;
use crate::engines::Transcoder;
use crate::error::{AppError, Result};
use crate::format::{Format, InputFamily};
use crate::package::{package, DownloadUnit};
use crate::router::{ConversionRequest, ConversionRouter};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

/// The file a user picked
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl SelectedFile {
    pub fn family(&self) -> Option<InputFamily> {
        InputFamily::classify(&self.mime_type, &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvertStatus {
    Converted { file_name: String },
    NoConversionNeeded,
}

/// Selected file and latest result for one user. Conversions are serialized
/// by the lock the store keeps around each session.
#[derive(Debug, Default)]
pub struct Session {
    selected: Option<SelectedFile>,
    converted: Option<DownloadUnit>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the selection, drop any previous result and return the
    /// formats the file can be converted to.
    pub fn select(&mut self, file: SelectedFile) -> &'static [Format] {
        let formats = FormatCatalog::lookup(&file.mime_type, &file.name);
        info!(
            "Selected {} ({}, {} bytes): {} formats",
            file.name,
            file.mime_type,
            file.data.len(),
            formats.len()
        );
        self.converted = None;
        self.selected = Some(file);
        formats
    }

    pub fn selected(&self) -> Option<&SelectedFile> {
        self.selected.as_ref()
    }

    /// Convert the selected file to `token`. A successful conversion replaces
    /// the stored result; a no-op or a failure leaves it untouched.
    pub async fn convert(
        &mut self,
        router: &ConversionRouter,
        token: &str,
        transcoder: Option<&dyn Transcoder>,
    ) -> Result<ConvertStatus> {
        let file = self.selected.as_ref().ok_or(AppError::NoFileSelected)?;

        let is_media = file.family().map(InputFamily::is_media).unwrap_or(false);
        if is_media && transcoder.is_none() {
            return Err(AppError::EngineUnavailable(
                "transcoding engine failed to load".to_string(),
            ));
        }

        let request = ConversionRequest::new(
            file.data.clone(),
            file.mime_type.clone(),
            file.name.clone(),
            token,
        );
        let span = info_span!("conversion", id = %Uuid::new_v4(), file = %file.name, token);
        let conversion = router.route(&request, transcoder).instrument(span).await?;

        match package(conversion, &request.file_name, token) {
            Some(unit) => {
                info!("Converted {} → {}", request.file_name, unit.file_name);
                let file_name = unit.file_name.clone();
                self.converted = Some(unit);
                Ok(ConvertStatus::Converted { file_name })
            }
            None => {
                info!("{} is already {}", request.file_name, token);
                Ok(ConvertStatus::NoConversionNeeded)
            }
        }
    }

    /// The most recent successful conversion
    pub fn download(&self) -> Result<&DownloadUnit> {
        self.converted.as_ref().ok_or(AppError::NothingToDownload)
    }
}

/// Sessions keyed by the id handed out on selection. Holds at most
/// `capacity` sessions and drops the oldest one to make room.
pub struct SessionStore {
    capacity: usize,
    inner: RwLock<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    sessions: HashMap<Uuid, Arc<Mutex<Session>>>,
    order: VecDeque<Uuid>,
}

impl SessionStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: RwLock::new(StoreInner::default()),
        }
    }

    /// Start a new empty session and return its id
    pub async fn create(&self) -> (Uuid, Arc<Mutex<Session>>) {
        let id = Uuid::new_v4();
        let session = Arc::new(Mutex::new(Session::new()));

        let mut inner = self.inner.write().await;
        while inner.order.len() >= self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.sessions.remove(&oldest);
                    debug!(session = %oldest, "Session evicted");
                }
                None => break,
            }
        }
        inner.sessions.insert(id, session.clone());
        inner.order.push_back(id);
        (id, session)
    }

    pub async fn get(&self, id: &Uuid) -> Result<Arc<Mutex<Session>>> {
        self.inner
            .read()
            .await
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::SessionNotFound(id.to_string()))
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }
}

/// Parse a client-supplied session id
pub fn parse_session_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::InvalidRequest(format!("malformed session id: {}", raw)))
}
