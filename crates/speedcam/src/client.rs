//! Entry point tying the gateway, snapshot store, synchronizer and upload
//! flow together over one transport.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::broadcast::{JobStore, SyncEvent, UploadProgressBroadcaster};
use crate::calibration::{CaptureEngine, CaptureSurface};
use crate::config::ClientConfig;
use crate::error::{Result, StateConflictError};
use crate::gateway::{JobGateway, Locator, ProcessingConfig, UploadRules};
use crate::models::{
    Ack, AnalyticsSummary, CalibrationRecord, Detection, DetectionFilter, HealthStatus, Job, JobId,
    JobStatusSnapshot,
};
use crate::sync::{FocusedJob, PollPolicy, PollSubscription, StatusSynchronizer};
use crate::transport::{HttpTransport, Transport};
use crate::upload::UploadController;

#[derive(Clone)]
pub struct SpeedcamClient {
    config: Arc<ClientConfig>,
    gateway: JobGateway,
    store: Arc<JobStore>,
    sync: StatusSynchronizer,
    uploads: UploadController,
}

impl SpeedcamClient {
    /// Connects over HTTP to `config.api.base_url`.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config.api, config.upload.chunk_size)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let gateway = JobGateway::new(transport, UploadRules::from(&config.upload));
        let store = Arc::new(JobStore::new());
        let sync = StatusSynchronizer::new(
            gateway.clone(),
            Arc::clone(&store),
            PollPolicy::from(&config.polling),
            config.polling.event_capacity,
        );
        let uploads = UploadController::new(
            gateway.clone(),
            Arc::clone(&store),
            sync.clone(),
            UploadProgressBroadcaster::new(config.polling.event_capacity.max(1)),
        );

        log::debug!("Client configured for {}", config.api.base_url);

        Self {
            config: Arc::new(config),
            gateway,
            store,
            sync,
            uploads,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn gateway(&self) -> &JobGateway {
        &self.gateway
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn synchronizer(&self) -> &StatusSynchronizer {
        &self.sync
    }

    /// The client's single upload controller.
    pub fn upload_controller(&self) -> UploadController {
        self.uploads.clone()
    }

    pub fn sync_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.sync.subscribe()
    }

    /// Lists jobs. Snapshots of jobs invalidated while the request was out
    /// are returned but not stored.
    pub async fn list_jobs(&self) -> Result<Vec<Arc<Job>>> {
        let epochs = self.store.epochs();
        let jobs = self.gateway.list().await?;
        Ok(jobs
            .into_iter()
            .map(|job| {
                let epoch = epochs.epoch(&job.id);
                self.keep(job, epoch)
            })
            .collect())
    }

    /// Reads the job from the server and stores the snapshot.
    pub async fn job(&self, id: &JobId) -> Result<Arc<Job>> {
        let epoch = self.store.epoch(id);
        let job = self.gateway.get(id).await?;
        Ok(self.keep(job, epoch))
    }

    fn keep(&self, job: Job, epoch: u64) -> Arc<Job> {
        let job = Arc::new(job);
        self.store.replace_job_if_current(Arc::clone(&job), epoch);
        job
    }

    pub async fn job_status(&self, id: &JobId) -> Result<JobStatusSnapshot> {
        self.gateway.status(id).await
    }

    pub fn watch(&self, id: &JobId) -> PollSubscription {
        self.sync.watch(id)
    }

    pub fn focus(&self) -> FocusedJob {
        FocusedJob::new(self.sync.clone())
    }

    /// Starts processing and resumes polling.
    ///
    /// Speed calculation needs a calibrated job: when it is requested for an
    /// uncalibrated one this fails with
    /// [`StateConflictError::CalibrationRequired`] and nothing is started.
    pub async fn start_processing(
        &self,
        id: &JobId,
        config: &ProcessingConfig,
    ) -> Result<PollSubscription> {
        config.validate()?;

        let job = self.job(id).await?;
        if config.enable_speed_calculation && !job.is_calibrated {
            log::info!("Job {} needs calibration before speed calculation", id);
            return Err(StateConflictError::CalibrationRequired { job_id: id.clone() }.into());
        }

        let epoch = self.store.epoch(id);
        let job = self.gateway.start_processing(id, config).await?;
        self.store.replace_job_if_current(job, epoch);
        log::info!("Processing started for job {}", id);
        Ok(self.sync.watch(id))
    }

    /// Opens the calibration capture for `id` and loads its reference frame.
    pub async fn open_calibration(
        &self,
        id: &JobId,
        surface: Box<dyn CaptureSurface>,
    ) -> Result<CaptureEngine> {
        let mut engine = CaptureEngine::new(
            id.clone(),
            self.gateway.clone(),
            Arc::clone(&self.store),
            surface,
            &self.config.calibration,
        );
        engine.activate().await?;
        Ok(engine)
    }

    pub async fn calibration(&self, id: &JobId) -> Result<Option<CalibrationRecord>> {
        let epoch = self.store.epoch(id);
        let record = self.gateway.get_calibration(id).await?;
        self.store.replace_calibration_if_current(id, record.clone(), epoch);
        Ok(record)
    }

    pub async fn delete_calibration(&self, id: &JobId) -> Result<Ack> {
        let ack = self.gateway.delete_calibration(id).await?;
        self.store.invalidate(id);
        Ok(ack)
    }

    /// Deletes the job, stops its polling and drops every cached snapshot.
    pub async fn delete_job(&self, id: &JobId) -> Result<Ack> {
        let ack = self.gateway.delete(id).await?;
        self.sync.stop(id);
        self.store.invalidate(id);
        log::info!("Deleted job {}", id);
        Ok(ack)
    }

    pub async fn detections(&self, id: &JobId, filter: &DetectionFilter) -> Result<Vec<Detection>> {
        let detections = self.gateway.detections(id).await?;
        Ok(filter.apply(detections))
    }

    pub async fn analytics(&self) -> Result<AnalyticsSummary> {
        self.gateway.analytics_summary().await
    }

    pub async fn health(&self) -> Result<HealthStatus> {
        self.gateway.health().await
    }

    pub fn download_locator(&self, id: &JobId) -> Locator {
        self.gateway.download_locator(id)
    }

    pub fn report_locator(&self, id: &JobId) -> Locator {
        self.gateway.report_locator(id)
    }

    pub async fn download(&self, id: &JobId) -> Result<Vec<u8>> {
        self.gateway.fetch(&self.gateway.download_locator(id)).await
    }

    pub async fn report(&self, id: &JobId) -> Result<Vec<u8>> {
        self.gateway.fetch(&self.gateway.report_locator(id)).await
    }
}
