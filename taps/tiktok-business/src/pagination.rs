//! Cursor-driven pagination as a lazy stream.

use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use tokio::sync::watch;
use tokio_stream::Stream;

/// One page of results together with the cursor for the page after it.
#[derive(Debug)]
pub struct Page<T, C> {
    pub items: VecDeque<T>,
    /// `None` means there are no more pages.
    pub next_cursor: Option<C>,
}

impl<T, C> Page<T, C> {
    pub fn last(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: items.into_iter().collect(),
            next_cursor: None,
        }
    }

    pub fn more(items: impl IntoIterator<Item = T>, next_cursor: C) -> Self {
        Self {
            items: items.into_iter().collect(),
            next_cursor: Some(next_cursor),
        }
    }
}

type OneFuturePage<'a, F, T, C> =
    Pin<Box<dyn Future<Output = Result<(F, Option<C>, Page<T, C>)>> + 'a + Send>>;

/// A paginated stream that fetches pages strictly one after another and yields their items.
///
/// The fetcher is called with `None` for the first page and with the previous page's cursor
/// after that. Items of a page are yielded in response order before the next page is
/// requested. If a page hands back the very cursor that was used to request it, the stream
/// yields that page's items and then a [`Error::PaginationLoop`] without issuing another
/// request.
///
/// When a cancellation signal is attached, it is checked before every request (never during
/// one); once set, the stream ends with [`Error::Cancelled`].
pub struct PagedStream<'a, T, C, F> {
    /// Current batch of items from the most recent API response
    current_items: VecDeque<T>,
    /// Future representing the currently pending API request, if any
    pending_request: Option<OneFuturePage<'a, F, T, C>>,
    /// Fetcher and cursor for the next request, once the pending one has resolved
    next_request: Option<(F, Option<C>)>,
    /// Error to surface once the current batch has drained
    deferred_error: Option<Error>,
    cancel: Option<watch::Receiver<bool>>,
    pages: u64,
    is_done: bool,
}

impl<'a, T, C, F, Fut> PagedStream<'a, T, C, F>
where
    F: Fn(Option<C>) -> Fut + Send + 'a,
    Fut: Future<Output = Result<Page<T, C>>> + Send + 'a,
    T: Send + 'a,
    C: Clone + PartialEq + fmt::Display + Send + 'a,
{
    pub fn new(fetcher: F) -> Self {
        Self {
            current_items: VecDeque::new(),
            pending_request: None,
            next_request: Some((fetcher, None)),
            deferred_error: None,
            cancel: None,
            pages: 0,
            is_done: false,
        }
    }

    /// Stops the stream before the next request once `cancel` reads `true`.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Number of pages received so far.
    pub fn pages_fetched(&self) -> u64 {
        self.pages
    }

    fn request(fetcher: F, cursor: Option<C>) -> OneFuturePage<'a, F, T, C> {
        Box::pin(async move {
            let page = fetcher(cursor.clone()).await?;
            Ok((fetcher, cursor, page))
        })
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

impl<'a, T, C, F> Unpin for PagedStream<'a, T, C, F> {}

impl<'a, T, C, F, Fut> Stream for PagedStream<'a, T, C, F>
where
    F: Fn(Option<C>) -> Fut + Send + 'a,
    Fut: Future<Output = Result<Page<T, C>>> + Send + 'a,
    T: Send + 'a,
    C: Clone + PartialEq + fmt::Display + Send + 'a,
{
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(item) = self.current_items.pop_front() {
                return Poll::Ready(Some(Ok(item)));
            }

            if let Some(e) = self.deferred_error.take() {
                self.is_done = true;
                return Poll::Ready(Some(Err(e)));
            }

            if self.is_done {
                return Poll::Ready(None);
            }

            if let Some(pending) = self.pending_request.as_mut() {
                match pending.as_mut().poll(cx) {
                    Poll::Ready(Ok((fetcher, used, page))) => {
                        self.pending_request = None;
                        self.pages += 1;
                        self.current_items.extend(page.items);

                        match page.next_cursor {
                            Some(next) if used.as_ref() == Some(&next) => {
                                self.deferred_error = Some(Error::PaginationLoop {
                                    cursor: next.to_string(),
                                });
                            }
                            Some(next) => self.next_request = Some((fetcher, Some(next))),
                            None => self.is_done = true,
                        }
                        continue;
                    }
                    Poll::Ready(Err(e)) => {
                        self.pending_request = None;
                        self.is_done = true;
                        return Poll::Ready(Some(Err(e)));
                    }
                    Poll::Pending => return Poll::Pending,
                }
            }

            let Some((fetcher, cursor)) = self.next_request.take() else {
                self.is_done = true;
                return Poll::Ready(None);
            };
            if self.is_cancelled() {
                self.is_done = true;
                return Poll::Ready(Some(Err(Error::Cancelled)));
            }
            self.pending_request = Some(Self::request(fetcher, cursor));
        }
    }
}
