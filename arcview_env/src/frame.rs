//! Display-frame scheduling.
//!
//! Owners request a one-shot callback for the *next* display frame and get
//! a token back, which can cancel the request until it fires. The driver
//! calls `take_due()` once per frame and dispatches the batch. Requests made
//! while a batch is being dispatched land in the following frame.
//!
//! ```text
//!   frame N              frame N+1
//!   take_due() ─► [a, b]   take_due() ─► [a]
//!       a.tick() ─► request(a)  ───────┘
//!       b.tick() ─► (halted, no request)
//! ```

use serde::{Deserialize, Serialize};

/// Handle for one pending frame request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameToken(pub u64);

/// Queue of pending frame requests keyed by owner.
#[derive(Debug, Clone)]
pub struct FrameScheduler<K> {
    /// Next token value to hand out
    next_token: u64,

    /// Pending requests in request order
    queue: Vec<(FrameToken, K)>,

    /// Number of batches taken so far
    frames_dispatched: u64,
}

impl<K> FrameScheduler<K> {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self {
            next_token: 0,
            queue: Vec::new(),
            frames_dispatched: 0,
        }
    }

    /// Requests a callback for `owner` on the next frame.
    pub fn request_frame(&mut self, owner: K) -> FrameToken {
        let token = FrameToken(self.next_token);
        self.next_token += 1;
        self.queue.push((token, owner));
        token
    }

    /// Cancels a pending request.
    ///
    /// Returns `false` if the token already fired or was never issued.
    pub fn cancel_frame(&mut self, token: FrameToken) -> bool {
        let before = self.queue.len();
        self.queue.retain(|(t, _)| *t != token);
        self.queue.len() != before
    }

    /// Removes and returns every request made before this call.
    pub fn take_due(&mut self) -> Vec<(FrameToken, K)> {
        self.frames_dispatched += 1;
        std::mem::take(&mut self.queue)
    }

    /// Returns true if the token is still waiting for a frame.
    pub fn is_pending(&self, token: FrameToken) -> bool {
        self.queue.iter().any(|(t, _)| *t == token)
    }

    /// Number of pending requests.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Number of frames dispatched via `take_due`.
    pub fn frames_dispatched(&self) -> u64 {
        self.frames_dispatched
    }
}

impl<K> Default for FrameScheduler<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_fire_in_order() {
        let mut frames = FrameScheduler::new();
        frames.request_frame("a");
        frames.request_frame("b");

        let due: Vec<_> = frames.take_due().into_iter().map(|(_, k)| k).collect();
        assert_eq!(due, vec!["a", "b"]);
        assert_eq!(frames.pending(), 0);
    }

    #[test]
    fn test_cancelled_request_never_fires() {
        let mut frames = FrameScheduler::new();
        let a = frames.request_frame(1u32);
        frames.request_frame(2u32);

        assert!(frames.cancel_frame(a));
        assert!(!frames.is_pending(a));

        let due: Vec<_> = frames.take_due().into_iter().map(|(_, k)| k).collect();
        assert_eq!(due, vec![2]);
    }

    #[test]
    fn test_cancel_after_fire_is_noop() {
        let mut frames = FrameScheduler::new();
        let a = frames.request_frame(1u32);
        frames.take_due();

        assert!(!frames.cancel_frame(a));
    }

    #[test]
    fn test_request_during_dispatch_lands_next_frame() {
        let mut frames = FrameScheduler::new();
        frames.request_frame(1u32);

        for (_, owner) in frames.take_due() {
            frames.request_frame(owner + 1);
        }

        assert_eq!(frames.pending(), 1);
        assert_eq!(frames.frames_dispatched(), 1);
        let due: Vec<_> = frames.take_due().into_iter().map(|(_, k)| k).collect();
        assert_eq!(due, vec![2]);
    }
}
