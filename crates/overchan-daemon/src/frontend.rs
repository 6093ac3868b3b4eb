//! Frontend attachment.
//!
//! The HTML frontend is an external collaborator; the daemon only owns a
//! pair of channels toward it, plus the newsgroup filter deciding which
//! articles it sees.

use overchan_wire::{Article, FRONTEND_GROUP_PREFIX};
use tokio::sync::mpsc;

/// Channel capacity in both directions.
const FRONTEND_CHANNEL_CAP: usize = 64;

/// Does the frontend want posts from this newsgroup?
pub fn frontend_allows_group(group: &str) -> bool {
    group.starts_with(FRONTEND_GROUP_PREFIX)
}

/// Daemon-side endpoints of an attached frontend.
pub struct FrontendLink {
    /// Accepted articles flowing to the frontend.
    pub to_frontend: mpsc::Sender<Article>,
    /// Posts submitted by frontend users, consumed by the dispatcher.
    pub from_frontend: Option<mpsc::Receiver<Article>>,
}

/// Frontend-side endpoints.
pub struct FrontendClient {
    /// Articles delivered by the daemon.
    pub posts: mpsc::Receiver<Article>,
    /// Submit a user post into the relay. Submissions enter the infeed
    /// directly, unsigned.
    pub submit: mpsc::Sender<Article>,
}

/// Create a connected link/client pair.
pub fn frontend_channels() -> (FrontendLink, FrontendClient) {
    let (to_frontend, posts) = mpsc::channel(FRONTEND_CHANNEL_CAP);
    let (submit, from_frontend) = mpsc::channel(FRONTEND_CHANNEL_CAP);
    (
        FrontendLink {
            to_frontend,
            from_frontend: Some(from_frontend),
        },
        FrontendClient { posts, submit },
    )
}
