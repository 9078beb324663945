use super::Request;
use crate::stun::ChannelData;
use crate::turn::Error;

/// process channel data
///
/// [RFC5766 §11.5](https://tools.ietf.org/html/rfc5766#section-11.5)
///
/// If the ChannelData message is received on a channel that is not
/// bound to any peer, then the message is silently discarded.  The
/// receipt of a ChannelData message MUST NOT refresh either the channel
/// binding or the permission towards the peer.
///
/// Otherwise the data field is written to the peer the channel is bound
/// to, from the allocation's relayed transport address; padding was
/// already stripped by the frame parser.
pub async fn process(req: Request<'_>, data: ChannelData<'_>) -> Result<(), Error> {
    let Some(allocation) = req.env.manager.get_allocation(&req.five_tuple) else {
        log::trace!("channel data without allocation, dropped: src={}", req.src());
        return Ok(());
    };

    let Some(peer) = allocation.channels().peer(data.number) else {
        log::trace!(
            "channel data on unbound channel, dropped: src={}, channel={:#06x}",
            req.src(),
            data.number,
        );

        return Ok(());
    };

    allocation.relay(data.bytes, peer).await
}
