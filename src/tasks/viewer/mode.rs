use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::events::{ExportRequest, PreviewMode, SnapshotRequest, ViewerCommand};
use crate::processing::filter_state::FilterState;
use crate::processing::saturation::SaturationParams;

/// Side effects the viewer must carry out after a command.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerAction {
    PauseRendering,
    ResumeRendering,
    RequestSnapshot(SnapshotRequest),
    RequestExport(ExportRequest),
}

/// What to do with a finished snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotDisposition {
    Current,
    Stale,
}

/// Live/snapshot switch and sole writer of the shared [`FilterState`].
///
/// Every background job gets a sequence number; only the newest snapshot
/// request may update the display, and the busy flag tracks exactly that
/// request.
pub struct ModeController {
    mode: PreviewMode,
    filter_state: Arc<FilterState>,
    export_path: PathBuf,
    next_seq: u64,
    awaiting_snapshot: Option<u64>,
}

impl ModeController {
    pub fn new(mode: PreviewMode, filter_state: Arc<FilterState>, export_path: PathBuf) -> Self {
        Self {
            mode,
            filter_state,
            export_path,
            next_seq: 0,
            awaiting_snapshot: None,
        }
    }

    pub fn mode(&self) -> PreviewMode {
        self.mode
    }

    pub fn params(&self) -> SaturationParams {
        self.filter_state.snapshot()
    }

    pub fn is_busy(&self) -> bool {
        self.awaiting_snapshot.is_some()
    }

    /// Actions that bring a freshly started viewer into the current mode.
    pub fn startup(&mut self) -> Vec<ControllerAction> {
        match self.mode {
            PreviewMode::Live => vec![ControllerAction::ResumeRendering],
            PreviewMode::Snapshot => vec![
                ControllerAction::PauseRendering,
                self.request_snapshot(),
            ],
        }
    }

    pub fn handle(&mut self, command: ViewerCommand) -> Vec<ControllerAction> {
        match command {
            ViewerCommand::SetSaturation(value) => {
                self.filter_state.store(value);
                self.after_parameter_change()
            }
            ViewerCommand::AdjustSaturation(delta) => {
                let current = self.filter_state.snapshot().saturation();
                self.filter_state.store(current + delta);
                self.after_parameter_change()
            }
            ViewerCommand::ResetSaturation => {
                self.filter_state.reset();
                self.after_parameter_change()
            }
            ViewerCommand::SetMode(mode) => self.switch_mode(mode),
            ViewerCommand::ToggleMode => self.switch_mode(self.mode.toggled()),
            ViewerCommand::Export => {
                let request = ExportRequest {
                    seq: self.take_seq(),
                    params: self.filter_state.snapshot(),
                    destination: self.export_path.clone(),
                };
                info!(
                    seq = request.seq,
                    saturation = request.params.saturation(),
                    path = %request.destination.display(),
                    "export requested"
                );
                vec![ControllerAction::RequestExport(request)]
            }
        }
    }

    /// Records completion of snapshot `seq`, successful or not.
    pub fn finish_snapshot(&mut self, seq: u64) -> SnapshotDisposition {
        if self.awaiting_snapshot == Some(seq) {
            self.awaiting_snapshot = None;
            SnapshotDisposition::Current
        } else {
            debug!(seq, awaiting = ?self.awaiting_snapshot, "dropping stale snapshot");
            SnapshotDisposition::Stale
        }
    }

    fn switch_mode(&mut self, mode: PreviewMode) -> Vec<ControllerAction> {
        if mode == self.mode {
            return Vec::new();
        }
        info!(from = ?self.mode, to = ?mode, "preview mode changed");
        self.mode = mode;
        self.filter_state.reset();
        match mode {
            PreviewMode::Live => {
                self.awaiting_snapshot = None;
                vec![ControllerAction::ResumeRendering]
            }
            PreviewMode::Snapshot => vec![
                ControllerAction::PauseRendering,
                self.request_snapshot(),
            ],
        }
    }

    fn after_parameter_change(&mut self) -> Vec<ControllerAction> {
        match self.mode {
            // the render loop reads the new value on its next tick
            PreviewMode::Live => Vec::new(),
            PreviewMode::Snapshot => vec![self.request_snapshot()],
        }
    }

    fn request_snapshot(&mut self) -> ControllerAction {
        let request = SnapshotRequest {
            seq: self.take_seq(),
            params: self.filter_state.snapshot(),
        };
        self.awaiting_snapshot = Some(request.seq);
        ControllerAction::RequestSnapshot(request)
    }

    fn take_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(mode: PreviewMode) -> ModeController {
        ModeController::new(mode, Arc::default(), PathBuf::from("/tmp/FilteredImage.jpg"))
    }

    fn snapshot_seq(actions: &[ControllerAction]) -> u64 {
        actions
            .iter()
            .find_map(|a| match a {
                ControllerAction::RequestSnapshot(req) => Some(req.seq),
                _ => None,
            })
            .expect("snapshot request")
    }

    #[test]
    fn live_mode_parameter_changes_need_no_background_work() {
        let mut c = controller(PreviewMode::Live);
        assert_eq!(c.startup(), vec![ControllerAction::ResumeRendering]);
        assert!(c.handle(ViewerCommand::SetSaturation(0.3)).is_empty());
        assert_eq!(c.params().saturation(), 0.3);
        assert!(c.handle(ViewerCommand::AdjustSaturation(5.0)).is_empty());
        assert_eq!(c.params().saturation(), 2.0);
    }

    #[test]
    fn switching_modes_resets_and_toggles_rendering() {
        let mut c = controller(PreviewMode::Live);
        c.handle(ViewerCommand::SetSaturation(0.0));
        let actions = c.handle(ViewerCommand::ToggleMode);
        assert_eq!(c.mode(), PreviewMode::Snapshot);
        assert_eq!(actions[0], ControllerAction::PauseRendering);
        assert!(c.params().is_identity());
        assert!(c.is_busy());

        let actions = c.handle(ViewerCommand::SetMode(PreviewMode::Live));
        assert_eq!(actions, vec![ControllerAction::ResumeRendering]);
        assert!(!c.is_busy());
        assert!(c.handle(ViewerCommand::SetMode(PreviewMode::Live)).is_empty());
    }

    #[test]
    fn only_the_newest_snapshot_is_current() {
        let mut c = controller(PreviewMode::Snapshot);
        let first = snapshot_seq(&c.startup());
        let second = snapshot_seq(&c.handle(ViewerCommand::SetSaturation(0.5)));
        let third = snapshot_seq(&c.handle(ViewerCommand::SetSaturation(0.7)));
        assert!(first < second && second < third);

        // completion order differs from issue order
        assert_eq!(c.finish_snapshot(third), SnapshotDisposition::Current);
        assert!(!c.is_busy());
        assert_eq!(c.finish_snapshot(first), SnapshotDisposition::Stale);
        assert_eq!(c.finish_snapshot(second), SnapshotDisposition::Stale);
        assert!(!c.is_busy());
    }

    #[test]
    fn export_captures_current_parameters() {
        let mut c = controller(PreviewMode::Live);
        c.handle(ViewerCommand::SetSaturation(1.4));
        let actions = c.handle(ViewerCommand::Export);
        match &actions[..] {
            [ControllerAction::RequestExport(req)] => {
                assert_eq!(req.params.saturation(), 1.4);
                assert_eq!(req.destination, PathBuf::from("/tmp/FilteredImage.jpg"));
            }
            other => panic!("unexpected actions {other:?}"),
        }
    }
}
