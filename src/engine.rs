use crate::{CaptionModel, CaptionOutcome, CaptionService, RgbImage};
use kornia_image::ImageSize;
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, AtomicUsize, Ordering},
        mpsc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

/// Represents the current state of the caption engine.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineState {
    /// The engine is waiting for images.
    Idle,
    /// The engine is generating a caption.
    Processing,
}

impl EngineState {
    /// Returns the state as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Idle => "idle",
            EngineState::Processing => "processing",
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum EngineError {
    #[error("Caption engine is stopped")]
    Stopped,

    #[error("Caption engine disconnected before answering")]
    Disconnected,
}

struct EngineRequest {
    id: u64,
    image: RgbImage,
    reply_tx: mpsc::Sender<CaptionResponse>,
}

/// Caption returned by the engine together with its telemetry.
#[derive(Debug)]
pub struct CaptionResponse {
    /// Identifier matching the ticket of the request.
    pub id: u64,
    /// Timestamp when the generation started.
    pub start_time: Instant,
    /// Total time spent generating.
    pub duration: Duration,
    /// Size of the submitted image.
    pub image_size: ImageSize,
    pub outcome: CaptionOutcome,
}

/// Handle to a scheduled caption.
pub struct CaptionTicket {
    id: u64,
    reply_rx: mpsc::Receiver<CaptionResponse>,
}

impl CaptionTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Blocks until the caption is ready.
    pub fn wait(self) -> Result<CaptionResponse, EngineError> {
        self.reply_rx.recv().map_err(|_| EngineError::Disconnected)
    }
}

/// Runs captions on a dedicated inference thread.
///
/// Requests are queued on a channel and served one after the other, so the single model
/// instance is never used concurrently and async callers never block their runtime on the
/// model.
pub struct CaptionEngine<M: CaptionModel + Send + 'static> {
    service: Arc<CaptionService<M>>,
    state: Arc<Mutex<EngineState>>,
    pending: Arc<AtomicUsize>,
    req_tx: Option<mpsc::Sender<EngineRequest>>,
    inference_handle: Option<JoinHandle<()>>,
    id_counter: AtomicU64,
}

impl<M: CaptionModel + Send + 'static> CaptionEngine<M> {
    /// Creates a new engine and spawns its inference thread.
    ///
    /// # Arguments
    /// * `service` - The service the inference thread forwards images to
    pub fn new(service: Arc<CaptionService<M>>) -> Self {
        let (req_tx, req_rx) = mpsc::channel::<EngineRequest>();
        let state = Arc::new(Mutex::new(EngineState::Idle));
        let pending = Arc::new(AtomicUsize::new(0));

        let inference_handle = std::thread::spawn({
            let service = service.clone();
            let state = state.clone();
            let pending = pending.clone();
            move || {
                while let Ok(req) = req_rx.recv() {
                    log::debug!("Scheduling caption #{}", req.id);

                    set_state(&state, EngineState::Processing);
                    let start_time = Instant::now();

                    let outcome = service.caption(&req.image);

                    log::debug!("Caption #{} completed", req.id);

                    let response = CaptionResponse {
                        id: req.id,
                        start_time,
                        duration: start_time.elapsed(),
                        image_size: req.image.size(),
                        outcome,
                    };

                    // bookkeeping first, a woken caller must observe the engine settled
                    pending.fetch_sub(1, Ordering::SeqCst);
                    set_state(&state, EngineState::Idle);

                    let _ = req.reply_tx.send(response);
                }
            }
        });

        Self {
            service,
            state,
            pending,
            req_tx: Some(req_tx),
            inference_handle: Some(inference_handle),
            id_counter: AtomicU64::new(0),
        }
    }

    /// Returns the current state of the engine.
    pub fn state(&self) -> EngineState {
        match self.state.lock() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of requests queued or running.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn model_name(&self) -> &str {
        self.service.model_name()
    }

    /// Queues an image for captioning.
    ///
    /// Each request gets a unique, increasing id.
    pub fn schedule(&self, image: RgbImage) -> Result<CaptionTicket, EngineError> {
        let tx = self.req_tx.as_ref().ok_or(EngineError::Stopped)?;
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        let (reply_tx, reply_rx) = mpsc::channel();

        self.pending.fetch_add(1, Ordering::SeqCst);
        if tx
            .send(EngineRequest {
                id,
                image,
                reply_tx,
            })
            .is_err()
        {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(EngineError::Stopped);
        }

        Ok(CaptionTicket { id, reply_rx })
    }

    /// Stops the engine after the queued requests are served.
    pub fn stop(&mut self) {
        self.req_tx.take();
        if let Some(handle) = self.inference_handle.take() {
            let _ = handle.join();
        }
    }
}

impl<M: CaptionModel + Send + 'static> Drop for CaptionEngine<M> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn set_state(state: &Mutex<EngineState>, value: EngineState) {
    match state.lock() {
        Ok(mut state) => *state = value,
        Err(poisoned) => *poisoned.into_inner() = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tests::{PanicOnce, ScriptedModel, red_image};

    fn engine(model: ScriptedModel) -> CaptionEngine<ScriptedModel> {
        CaptionEngine::new(Arc::new(CaptionService::new(model)))
    }

    #[test]
    fn schedule_and_wait() -> Result<(), EngineError> {
        let engine = engine(ScriptedModel::always("a red square"));
        assert_eq!(engine.state(), EngineState::Idle);
        assert_eq!(engine.model_name(), "scripted");

        let ticket = engine.schedule(red_image())?;
        let response = ticket.wait()?;
        assert_eq!(response.id, 0);
        assert_eq!(response.image_size.width, 100);
        assert_eq!(
            response.outcome,
            CaptionOutcome::Caption("a red square".to_string())
        );

        Ok(())
    }

    #[test]
    fn ids_increase_in_order() -> Result<(), EngineError> {
        let engine = engine(ScriptedModel::new(vec![Ok("one"), Ok("two"), Ok("three")]));

        let tickets = (0..3)
            .map(|_| engine.schedule(red_image()))
            .collect::<Result<Vec<_>, _>>()?;
        let captions = tickets
            .into_iter()
            .map(|t| t.wait().map(|r| (r.id, r.outcome)))
            .collect::<Result<Vec<_>, _>>()?;

        assert_eq!(
            captions,
            vec![
                (0, CaptionOutcome::Caption("one".to_string())),
                (1, CaptionOutcome::Caption("two".to_string())),
                (2, CaptionOutcome::Caption("three".to_string())),
            ]
        );
        assert_eq!(engine.pending(), 0);

        Ok(())
    }

    #[test]
    fn failure_then_success() -> Result<(), EngineError> {
        let engine = engine(ScriptedModel::new(vec![Err("boom"), Ok("a cat")]));

        let first = engine.schedule(red_image())?.wait()?;
        assert!(!first.outcome.is_caption());
        let second = engine.schedule(red_image())?.wait()?;
        assert!(second.outcome.is_caption());

        Ok(())
    }

    #[test]
    fn survives_model_panic() -> Result<(), EngineError> {
        let engine = CaptionEngine::new(Arc::new(CaptionService::new(PanicOnce {
            panicked: false,
        })));

        let first = engine.schedule(red_image())?.wait()?;
        assert!(!first.outcome.is_caption());

        let second = engine.schedule(red_image())?.wait()?;
        assert_eq!(
            second.outcome,
            CaptionOutcome::Caption("a red square".to_string())
        );
        assert_eq!(engine.state(), EngineState::Idle);

        Ok(())
    }

    #[test]
    fn schedule_after_stop() {
        let mut engine = engine(ScriptedModel::always("a cat"));
        engine.stop();
        assert_eq!(
            engine.schedule(red_image()).err(),
            Some(EngineError::Stopped)
        );
    }
}
