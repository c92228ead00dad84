//! Collects lines before and after matches.
use std::collections::VecDeque;

use crate::results::MatchContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Initial,
    CollectingPre,
    CollectingPost,
}

/// Attaches context lines to matches as a file streams by.
///
/// Holds at most one match whose post-context is still being collected. A new
/// match arriving before that completes flushes the held one with whatever
/// post-context it has.
#[derive(Debug)]
pub struct ContextTracker<T> {
    pre_cap: usize,
    post_cap: usize,
    state: TrackerState,
    ring: VecDeque<(u64, String)>,
    post: Vec<(u64, String)>,
    pending: Option<(T, Vec<(u64, String)>)>,
}

impl<T> ContextTracker<T> {
    pub fn new(pre_cap: usize, post_cap: usize) -> Self {
        Self {
            pre_cap,
            post_cap,
            state: TrackerState::Initial,
            ring: VecDeque::with_capacity(pre_cap),
            post: Vec::with_capacity(post_cap),
            pending: None,
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    /// True when no match is waiting for post-context
    pub fn is_idle(&self) -> bool {
        self.pending.is_none()
    }

    fn wants_context(&self) -> bool {
        self.pre_cap > 0 || self.post_cap > 0
    }

    /// Feeds line `number`, which did not match
    pub fn push_line(&mut self, number: u64, line: &str, emit: &mut impl FnMut(T, Option<MatchContext>)) {
        if self.state == TrackerState::CollectingPost {
            self.post.push((number, line.to_string()));
            if self.post.len() >= self.post_cap {
                self.flush(emit);
            }
        }
        if self.state == TrackerState::Initial {
            self.state = TrackerState::CollectingPre;
        }
        if self.pre_cap > 0 {
            if self.ring.len() == self.pre_cap {
                self.ring.pop_front();
            }
            self.ring.push_back((number, line.to_string()));
        }
    }

    /// Feeds a matching line's record
    pub fn push_match(&mut self, item: T, emit: &mut impl FnMut(T, Option<MatchContext>)) {
        self.flush(emit);
        let pre: Vec<(u64, String)> = self.ring.drain(..).collect();
        self.pending = Some((item, pre));
        if self.post_cap == 0 {
            self.flush(emit);
        } else {
            self.state = TrackerState::CollectingPost;
        }
    }

    /// Emits the held match, if any, at end of input
    pub fn finish(&mut self, emit: &mut impl FnMut(T, Option<MatchContext>)) {
        self.flush(emit);
    }

    /// Drops the held match without emitting it
    pub fn discard(&mut self) {
        self.pending = None;
        self.post.clear();
    }

    fn flush(&mut self, emit: &mut impl FnMut(T, Option<MatchContext>)) {
        let post = std::mem::take(&mut self.post);
        if let Some((item, pre)) = self.pending.take() {
            let context = self.wants_context().then(|| {
                let (pre_lines, pre) = pre.into_iter().unzip();
                let (post_lines, post) = post.into_iter().unzip();
                MatchContext {
                    pre,
                    post,
                    pre_lines,
                    post_lines,
                }
            });
            emit(item, context);
        }
        self.state = TrackerState::CollectingPre;
    }
}
