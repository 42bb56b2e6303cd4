//! Ordered results of one execution.

use crate::channel::messages::ResultItem;
use crate::channel::ExecutionChannel;
use crate::error::ChannelError;
use crate::query::cursor::CursorState;
use crate::query::options::CursorSettings;

/// One item of a result sequence.
pub(crate) enum SequenceItem {
    /// Row-producing result with its cursor state
    Rows(CursorState),
    /// Data-modification count
    UpdateCount(i64),
}

/// The complete result list of one execution plus a current position.
///
/// Item 0 is current right after execution. The position only moves forward
/// and may run one past the last item.
pub(crate) struct ResultSequence {
    id: u64,
    items: Vec<SequenceItem>,
    position: usize,
}

impl ResultSequence {
    /// Build a sequence; every row set gets cursor state with `settings`.
    pub(crate) fn new(id: u64, items: Vec<ResultItem>, settings: CursorSettings) -> Self {
        let items = items
            .into_iter()
            .map(|item| match item {
                ResultItem::RowSet {
                    handle,
                    columns,
                    scrollability,
                } => SequenceItem::Rows(CursorState::new(handle, columns, scrollability, settings)),
                ResultItem::UpdateCount(count) => SequenceItem::UpdateCount(count),
            })
            .collect();

        Self {
            id,
            items,
            position: 0,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn position(&self) -> usize {
        self.position
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn current(&self) -> Option<&SequenceItem> {
        self.items.get(self.position)
    }

    pub(crate) fn current_is_row_set(&self) -> bool {
        matches!(self.current(), Some(SequenceItem::Rows(_)))
    }

    /// Update count of the current item, or -1 if it is not an update count.
    pub(crate) fn update_count(&self) -> i64 {
        match self.current() {
            Some(SequenceItem::UpdateCount(count)) => *count,
            _ => -1,
        }
    }

    pub(crate) fn cursor_mut(&mut self, index: usize) -> Option<&mut CursorState> {
        match self.items.get_mut(index) {
            Some(SequenceItem::Rows(cursor)) => Some(cursor),
            _ => None,
        }
    }

    /// Close the current cursor (if any) and move to the next item.
    ///
    /// The position moves even if releasing the previous cursor fails.
    ///
    /// # Returns
    /// Whether the new current item is a row set.
    pub(crate) async fn advance(
        &mut self,
        channel: &mut dyn ExecutionChannel,
    ) -> Result<bool, ChannelError> {
        let released = match self.items.get_mut(self.position) {
            Some(SequenceItem::Rows(cursor)) => cursor.close(channel).await,
            _ => Ok(()),
        };

        if self.position < self.items.len() {
            self.position += 1;
        }

        released.map(|_| self.current_is_row_set())
    }

    /// Move to the first update count, closing every row set before it.
    ///
    /// # Returns
    /// The update count, or `None` if the sequence has none. Release
    /// failures are collected into `failures`.
    pub(crate) async fn skip_to_update_count(
        &mut self,
        channel: &mut dyn ExecutionChannel,
        failures: &mut Vec<String>,
    ) -> Option<i64> {
        while self.position < self.items.len() {
            match &mut self.items[self.position] {
                SequenceItem::UpdateCount(count) => return Some(*count),
                SequenceItem::Rows(cursor) => {
                    if let Err(e) = cursor.close(channel).await {
                        failures.push(e.to_string());
                    }
                }
            }
            self.position += 1;
        }
        None
    }

    /// Close every cursor of the sequence, best-effort.
    ///
    /// # Returns
    /// One message per failed release.
    pub(crate) async fn close(&mut self, channel: &mut dyn ExecutionChannel) -> Vec<String> {
        let mut failures = Vec::new();
        for item in self.items.iter_mut() {
            if let SequenceItem::Rows(cursor) = item {
                if let Err(e) = cursor.close(channel).await {
                    failures.push(e.to_string());
                }
            }
        }
        self.position = self.items.len();
        failures
    }
}
