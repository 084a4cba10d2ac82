/*!
 * File-Operation Participants
 * Before-operation hooks with a bounded time budget; participants observe,
 * they cannot veto
 */

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::warn;
use parking_lot::RwLock;

use crate::stream::CancellationToken;
use crate::types::{FileOperation, FsResult};
use crate::uri::Uri;

/// Budget each participant gets before it is abandoned
const PARTICIPANT_TIMEOUT: Duration = Duration::from_secs(5);

/// Description of the operation a participant is invoked for
#[derive(Debug, Clone)]
pub struct ParticipantEvent {
    pub operation: FileOperation,
    pub resource: Uri,
    pub target: Option<Uri>,
}

/// External hook invoked before move/copy/delete/create.
///
/// Errors are logged and swallowed; an overrunning participant sees its
/// token cancelled and the operation proceeds without it.
pub trait FileOperationParticipant: Send + Sync {
    fn participate(&self, event: &ParticipantEvent, token: &CancellationToken) -> FsResult<()>;
}

pub(crate) struct Participants {
    list: RwLock<Vec<Arc<dyn FileOperationParticipant>>>,
}

impl Participants {
    pub(crate) fn new() -> Self {
        Self {
            list: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn register(&self, participant: Arc<dyn FileOperationParticipant>) {
        self.list.write().push(participant);
    }

    pub(crate) fn participate(
        &self,
        operation: FileOperation,
        resource: &Uri,
        target: Option<&Uri>,
    ) {
        let participants: Vec<Arc<dyn FileOperationParticipant>> = self.list.read().clone();
        if participants.is_empty() {
            return;
        }

        let event = ParticipantEvent {
            operation,
            resource: resource.clone(),
            target: target.cloned(),
        };

        for participant in participants {
            let token = CancellationToken::new();
            let (done_tx, done_rx) = flume::bounded(1);
            let thread_event = event.clone();
            let thread_token = token.clone();
            thread::spawn(move || {
                let _ = done_tx.send(participant.participate(&thread_event, &thread_token));
            });

            match done_rx.recv_timeout(PARTICIPANT_TIMEOUT) {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    warn!("Participant failed for {:?} {}: {error}", operation, resource);
                }
                Err(_) => {
                    token.cancel();
                    warn!(
                        "Participant timed out for {:?} {}; proceeding without it",
                        operation, resource
                    );
                }
            }
        }
    }
}
