//! Records sent from the [`Controller`](crate::Controller) to the
//! [`AudioCore`](crate::AudioCore).
//!
//! Everything a command owns was allocated on the control thread; the audio
//! thread only moves it into place or hands it back for destruction.

use cadenza_core::{GraphCommand, TransportCommand};
use cadenza_recorder::RecorderCommand;

pub enum Command {
    Graph(GraphCommand),
    Transport(TransportCommand),
    Recorder(RecorderCommand),
    /// A new time map has been published; report the tempo at the playhead.
    TempoMapChanged,
    /// Silence every sequencer voice without touching the transport.
    PanicMidi,
}

impl Command {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Command::Graph(_) => "graph",
            Command::Transport(_) => "transport",
            Command::Recorder(_) => "recorder",
            Command::TempoMapChanged => "tempo-map",
            Command::PanicMidi => "panic",
        }
    }
}

impl From<GraphCommand> for Command {
    fn from(command: GraphCommand) -> Self {
        Command::Graph(command)
    }
}

impl From<TransportCommand> for Command {
    fn from(command: TransportCommand) -> Self {
        Command::Transport(command)
    }
}

impl From<RecorderCommand> for Command {
    fn from(command: RecorderCommand) -> Self {
        Command::Recorder(command)
    }
}
