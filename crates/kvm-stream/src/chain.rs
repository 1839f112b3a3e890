//! Ready-made filter chains.
//!
//! ```text
//! secure_chain:  CryptoFilter ─▶ FramingFilter ─▶ BufferedStream ─▶ TransportStream
//! framed_chain:                  FramingFilter ─▶ BufferedStream ─▶ TransportStream
//! ```
//!
//! Every layer shares the transport's [`crate::event::EventTarget`], so a
//! consumer subscribes once regardless of depth.

use std::sync::Arc;

use crate::cipher::{Cipher, Role};
use crate::config::StreamConfig;
use crate::event::SharedEventQueue;
use crate::filter::{BufferedStream, CryptoFilter, FramingFilter};
use crate::transport::{NativeHandle, TransportStream};

/// Message-framed chain without encryption.
pub type FramedChain<H> = FramingFilter<BufferedStream<TransportStream<H>>>;

/// Encrypted, message-framed chain.
pub type SecureChain<H> = CryptoFilter<FramedChain<H>>;

/// Builds a [`FramedChain`] over `handle`.
pub fn framed_chain<H: NativeHandle>(
    handle: H,
    events: SharedEventQueue,
    config: &StreamConfig,
) -> FramedChain<H> {
    let transport = TransportStream::new(handle, Arc::clone(&events), config);
    let buffered = BufferedStream::new(transport, Arc::clone(&events), config);
    FramingFilter::new(buffered, events, config)
}

/// Builds a [`SecureChain`] over `handle`.
pub fn secure_chain<H: NativeHandle>(
    handle: H,
    events: SharedEventQueue,
    config: &StreamConfig,
    cipher: Cipher,
) -> SecureChain<H> {
    let framed = framed_chain(handle, Arc::clone(&events), config);
    CryptoFilter::new(framed, events, cipher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ChannelEventQueue;
    use crate::stream::Stream;
    use crate::transport::memory::MemoryPipe;

    #[test]
    fn test_every_layer_reports_the_transport_target() {
        // Arrange
        let (queue, _rx) = ChannelEventQueue::new();
        let events: SharedEventQueue = Arc::new(queue);
        let (a, _b) = MemoryPipe::pair();

        // Act
        let chain = secure_chain(a, events, &StreamConfig::default(), Cipher::from_key([0; 32], Role::Initiator));

        // Assert
        let root = chain.inner().inner().inner().event_target();
        assert_eq!(chain.event_target(), root);
        assert_eq!(chain.inner().event_target(), root);
        assert_eq!(chain.inner().inner().event_target(), root);
    }

    #[test]
    fn test_source_is_forwarded_from_transport() {
        let (queue, _rx) = ChannelEventQueue::new();
        let (a, _b) = MemoryPipe::pair_named("desk", "laptop");

        let chain = framed_chain(a, Arc::new(queue), &StreamConfig::default());

        assert_eq!(chain.source(), "laptop");
    }
}
