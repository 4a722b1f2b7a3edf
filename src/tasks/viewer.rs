mod backend;
pub mod frame;
pub mod mode;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use backend::WgpuBackend;
use frame::{FrameOutcome, FrameRenderer, RenderState, TextureSlot};
use mode::{ControllerAction, ModeController, SnapshotDisposition};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes},
};

use crate::{
    config::Configuration,
    events::{PreviewMode, ProcessorEvent, ProcessorJob, ViewerCommand},
    gpu::texture::TextureSource,
    processing::filter_state::FilterState,
    source::SourceImage,
};

#[derive(Debug)]
enum ViewerEvent {
    Cancelled,
    Command(ViewerCommand),
    Processor(ProcessorEvent),
}

/// What a key press asks the viewer to do.
#[derive(Debug, Clone, Copy, PartialEq)]
enum KeyAction {
    Command(ViewerCommand),
    Quit,
}

fn key_action(code: KeyCode, step: f32) -> Option<KeyAction> {
    let command = match code {
        KeyCode::ArrowUp | KeyCode::ArrowRight => ViewerCommand::AdjustSaturation(step),
        KeyCode::ArrowDown | KeyCode::ArrowLeft => ViewerCommand::AdjustSaturation(-step),
        KeyCode::Digit0 | KeyCode::Numpad0 => ViewerCommand::SetSaturation(0.0),
        KeyCode::KeyR => ViewerCommand::ResetSaturation,
        KeyCode::Tab | KeyCode::KeyM => ViewerCommand::ToggleMode,
        KeyCode::KeyS => ViewerCommand::Export,
        KeyCode::Escape | KeyCode::KeyQ => return Some(KeyAction::Quit),
        _ => return None,
    };
    Some(KeyAction::Command(command))
}

fn window_title(base: &str, mode: PreviewMode, saturation: f32, busy: bool) -> String {
    let mode = match mode {
        PreviewMode::Live => "live",
        PreviewMode::Snapshot => "snapshot",
    };
    let mut title = format!("{base} - saturation {saturation:.2} ({mode})");
    if busy {
        title.push_str(" - processing");
    }
    title
}

struct ViewerApp {
    cfg: Configuration,
    cancel: CancellationToken,
    source_path: PathBuf,
    window: Option<Arc<Window>>,
    backend: Option<WgpuBackend>,
    renderer: FrameRenderer,
    controller: ModeController,
    jobs: UnboundedSender<ProcessorJob>,
    started: bool,
    pending_redraw: bool,
    startup_error: Option<anyhow::Error>,
}

impl ViewerApp {
    fn new(
        cfg: Configuration,
        cancel: CancellationToken,
        source_path: PathBuf,
        filter_state: Arc<FilterState>,
        jobs: UnboundedSender<ProcessorJob>,
    ) -> Self {
        let controller = ModeController::new(
            cfg.initial_mode,
            filter_state.clone(),
            cfg.export_path(),
        );
        Self {
            renderer: FrameRenderer::new(filter_state, RenderState::Paused),
            controller,
            cfg,
            cancel,
            source_path,
            window: None,
            backend: None,
            jobs,
            started: false,
            pending_redraw: false,
            startup_error: None,
        }
    }

    fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Option<Arc<Window>> {
        if let Some(window) = self.window.as_ref() {
            return Some(window.clone());
        }

        let attrs = WindowAttributes::default().with_title(self.cfg.viewer.title.clone());
        match event_loop.create_window(attrs) {
            Ok(window) => {
                let window = Arc::new(window);
                self.window = Some(window.clone());
                Some(window)
            }
            Err(err) => {
                error!(error = %err, "failed to create viewer window");
                None
            }
        }
    }

    fn init_gpu(&mut self, window: Arc<Window>) -> Result<()> {
        let textures = TextureSource::new(self.cfg.texture_origin);
        let backend = WgpuBackend::new(window, &self.source_path, textures, &self.cfg.viewer)?;
        self.backend = Some(backend);
        Ok(())
    }

    fn dispatch(&mut self, command: ViewerCommand) {
        debug!(?command, "viewer command");
        let actions = self.controller.handle(command);
        self.apply(actions);
        // live frames pick the new value up on their own; stills need a nudge
        self.request_redraw();
    }

    fn apply(&mut self, actions: Vec<ControllerAction>) {
        for action in actions {
            match action {
                ControllerAction::PauseRendering => {
                    self.renderer.pause();
                    if let Some(backend) = self.backend.as_mut() {
                        backend.clear_snapshot();
                    }
                }
                ControllerAction::ResumeRendering => {
                    self.renderer.resume();
                    self.request_redraw();
                }
                ControllerAction::RequestSnapshot(request) => {
                    debug!(seq = request.seq, saturation = request.params.saturation(), "snapshot requested");
                    if self.jobs.send(ProcessorJob::Snapshot(request)).is_err() {
                        warn!("snapshot processor is gone; request dropped");
                    }
                }
                ControllerAction::RequestExport(request) => {
                    if self.jobs.send(ProcessorJob::Export(request)).is_err() {
                        warn!("snapshot processor is gone; export dropped");
                    }
                }
            }
        }
        self.update_title();
    }

    fn on_processor_event(&mut self, event: ProcessorEvent) {
        match event {
            ProcessorEvent::SnapshotReady { seq, image } => {
                if self.controller.finish_snapshot(seq) == SnapshotDisposition::Current {
                    if let Some(backend) = self.backend.as_mut() {
                        backend.set_snapshot(&image);
                    }
                    self.request_redraw();
                }
            }
            ProcessorEvent::SnapshotFailed { seq, error } => {
                if self.controller.finish_snapshot(seq) == SnapshotDisposition::Current {
                    warn!(seq, error = %error, "showing placeholder for failed snapshot");
                    if let Some(backend) = self.backend.as_mut() {
                        backend.set_snapshot(SourceImage::placeholder().pixels());
                    }
                    self.request_redraw();
                }
            }
            ProcessorEvent::ExportFinished {
                seq,
                destination,
                result,
            } => match result {
                Ok(()) => info!(seq, path = %destination.display(), "export finished"),
                Err(err) => error!(seq, path = %destination.display(), error = %err, "export failed"),
            },
        }
        self.update_title();
    }

    fn draw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        self.pending_redraw = false;

        let outcome = match self.renderer.state() {
            RenderState::Running => self.renderer.tick(backend),
            RenderState::Paused => {
                // before the first snapshot arrives the unfiltered source stands in
                let slot = if backend.has_snapshot() {
                    TextureSlot::Snapshot
                } else {
                    TextureSlot::Live
                };
                self.renderer.present_still(backend, slot)
            }
        };
        if let FrameOutcome::Skipped(reason) = outcome {
            debug!(?reason, "frame skipped");
        }

        if backend.is_fatal() {
            error!("GPU device cannot present frames; exiting event loop");
            event_loop.exit();
            return;
        }
        if self.renderer.state() == RenderState::Running
            || matches!(outcome, FrameOutcome::Skipped(_))
        {
            self.pending_redraw = true;
        }
    }

    fn handle_resize(&mut self, width: u32, height: u32) {
        if let Some(backend) = self.backend.as_mut() {
            backend.resize(width, height);
        }
        self.request_redraw();
    }

    fn update_title(&self) {
        if let Some(window) = self.window.as_ref() {
            window.set_title(&window_title(
                &self.cfg.viewer.title,
                self.controller.mode(),
                self.controller.params().saturation(),
                self.controller.is_busy(),
            ));
        }
    }

    fn request_redraw(&mut self) {
        self.pending_redraw = true;
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

impl ApplicationHandler<ViewerEvent> for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.cancel.is_cancelled() {
            event_loop.exit();
            return;
        }

        let Some(window) = self.ensure_window(event_loop) else {
            event_loop.exit();
            return;
        };

        if self.backend.is_none() {
            if let Err(err) = self.init_gpu(window) {
                error!(error = ?err, "failed to initialize GPU state");
                self.startup_error = Some(err);
                event_loop.exit();
                return;
            }
        }

        if !self.started {
            self.started = true;
            let actions = self.controller.startup();
            self.apply(actions);
        }
        self.request_redraw();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if window.id() != window_id {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("viewer window close requested");
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                self.handle_resize(new_size.width, new_size.height);
            }
            WindowEvent::ScaleFactorChanged {
                mut inner_size_writer,
                ..
            } => {
                let size = window.inner_size();
                let _ = inner_size_writer.request_inner_size(size);
                self.handle_resize(size.width, size.height);
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => match key_action(code, self.cfg.saturation.step) {
                Some(KeyAction::Command(command)) => self.dispatch(command),
                Some(KeyAction::Quit) => {
                    info!("quit requested from keyboard");
                    event_loop.exit();
                }
                None => {}
            },
            WindowEvent::RedrawRequested => {
                self.draw(event_loop);
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if self.pending_redraw {
            if let Some(window) = self.window.as_ref() {
                window.request_redraw();
            }
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: ViewerEvent) {
        match event {
            ViewerEvent::Cancelled => {
                info!("viewer received cancellation event");
                event_loop.exit();
            }
            ViewerEvent::Command(command) => self.dispatch(command),
            ViewerEvent::Processor(event) => self.on_processor_event(event),
        }
    }
}

fn forward<T: Send + 'static>(
    proxy: EventLoopProxy<ViewerEvent>,
    mut rx: UnboundedReceiver<T>,
    wrap: fn(T) -> ViewerEvent,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            if proxy.send_event(wrap(item)).is_err() {
                break;
            }
        }
    })
}

/// Runs the viewer on the calling thread until the window closes or `cancel`
/// fires. Must be called from within a tokio runtime. Fails when the window,
/// the GPU or the source texture cannot be set up.
pub fn run_windowed(
    cfg: Configuration,
    source_path: PathBuf,
    filter_state: Arc<FilterState>,
    jobs: UnboundedSender<ProcessorJob>,
    results: UnboundedReceiver<ProcessorEvent>,
    control: UnboundedReceiver<ViewerCommand>,
    cancel: CancellationToken,
) -> Result<()> {
    let event_loop = EventLoop::<ViewerEvent>::with_user_event()
        .build()
        .context("failed to build viewer event loop")?;
    let proxy = event_loop.create_proxy();

    let cancel_task = {
        let cancel = cancel.clone();
        let proxy = proxy.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            let _ = proxy.send_event(ViewerEvent::Cancelled);
        })
    };
    let results_task = forward(proxy.clone(), results, ViewerEvent::Processor);
    let control_task = forward(proxy, control, ViewerEvent::Command);

    let mut app = ViewerApp::new(cfg, cancel, source_path, filter_state, jobs);
    let run_result = event_loop.run_app(&mut app);
    cancel_task.abort();
    results_task.abort();
    control_task.abort();

    info!(
        rendered = app.renderer.frames_rendered(),
        skipped = app.renderer.frames_skipped(),
        "viewer stopped"
    );
    run_result.context("viewer event loop failed")?;
    match app.startup_error.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrow_keys_step_saturation() {
        assert_eq!(
            key_action(KeyCode::ArrowUp, 0.05),
            Some(KeyAction::Command(ViewerCommand::AdjustSaturation(0.05)))
        );
        assert_eq!(
            key_action(KeyCode::ArrowLeft, 0.1),
            Some(KeyAction::Command(ViewerCommand::AdjustSaturation(-0.1)))
        );
    }

    #[test]
    fn control_keys_map_to_commands() {
        assert_eq!(
            key_action(KeyCode::KeyR, 0.05),
            Some(KeyAction::Command(ViewerCommand::ResetSaturation))
        );
        assert_eq!(
            key_action(KeyCode::Tab, 0.05),
            Some(KeyAction::Command(ViewerCommand::ToggleMode))
        );
        assert_eq!(
            key_action(KeyCode::KeyS, 0.05),
            Some(KeyAction::Command(ViewerCommand::Export))
        );
        assert_eq!(key_action(KeyCode::Escape, 0.05), Some(KeyAction::Quit));
        assert_eq!(key_action(KeyCode::KeyZ, 0.05), None);
    }

    #[test]
    fn title_reports_mode_and_busy_state() {
        assert_eq!(
            window_title("Viewer", PreviewMode::Live, 1.0, false),
            "Viewer - saturation 1.00 (live)"
        );
        assert_eq!(
            window_title("Viewer", PreviewMode::Snapshot, 0.25, true),
            "Viewer - saturation 0.25 (snapshot) - processing"
        );
    }
}
