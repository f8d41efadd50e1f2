use log::{debug, info};
use shared::{Player, PlayerId, StateSnapshot};

/// Server assignment handed out by the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchAssignment {
    pub host: String,
    pub port: u16,
    pub token: String,
    pub player: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientStatus {
    Searching,
    Joining,
    Playing,
    Finished,
    Disconnected(String),
}

/// What the client knows about its match, as last reported by the server
#[derive(Debug, Clone)]
pub struct ClientGameState {
    status: ClientStatus,
    assignment: Option<MatchAssignment>,
    last_frame: Option<u64>,
    latest: Option<StateSnapshot>,
}

impl ClientGameState {
    pub fn new() -> Self {
        Self {
            status: ClientStatus::Searching,
            assignment: None,
            last_frame: None,
            latest: None,
        }
    }

    pub fn status(&self) -> &ClientStatus {
        &self.status
    }

    pub fn assignment(&self) -> Option<&MatchAssignment> {
        self.assignment.as_ref()
    }

    pub fn last_frame(&self) -> Option<u64> {
        self.last_frame
    }

    pub fn latest(&self) -> Option<&StateSnapshot> {
        self.latest.as_ref()
    }

    pub fn assign(&mut self, assignment: MatchAssignment) {
        self.assignment = Some(assignment);
        self.last_frame = None;
        self.latest = None;
        self.status = ClientStatus::Joining;
    }

    /// Keeps a snapshot if it is ours and not older than the last one kept
    pub fn apply_state(&mut self, snapshot: StateSnapshot) -> bool {
        let Some(assignment) = &self.assignment else {
            debug!("Dropping frame {} received before a match", snapshot.frame);
            return false;
        };

        if snapshot.token != assignment.token {
            debug!("Dropping frame {} stamped with another token", snapshot.frame);
            return false;
        }

        if let Some(last) = self.last_frame {
            if snapshot.frame < last {
                debug!("Dropping stale frame {} (have {})", snapshot.frame, last);
                return false;
            }
        }

        if self.status == ClientStatus::Joining {
            info!("First frame received, match is running");
            self.status = ClientStatus::Playing;
        }

        self.last_frame = Some(snapshot.frame);
        self.latest = Some(snapshot);
        true
    }

    pub fn finish(&mut self) {
        self.status = ClientStatus::Finished;
    }

    pub fn disconnect(&mut self, reason: impl Into<String>) {
        self.status = ClientStatus::Disconnected(reason.into());
    }

    pub fn local_player(&self) -> Option<&Player> {
        let player = self.assignment.as_ref()?.player;
        self.latest.as_ref().map(|snapshot| snapshot.player(player))
    }
}

impl Default for ClientGameState {
    fn default() -> Self {
        Self::new()
    }
}
