use super::Request;
use crate::stun::{
    attribute::{Data, XorPeerAddress},
    MessageRef,
};
use crate::turn::Error;

/// process send indication
///
/// [RFC5766 §10.2](https://tools.ietf.org/html/rfc5766#section-10.2)
///
/// Indications are never authenticated; the guard is the permission
/// installed beforehand.  The Send indication MUST contain both an
/// XOR-PEER-ADDRESS attribute and a DATA attribute, and the peer's IP
/// must hold a live permission on the allocation for this five-tuple.
/// Everything that fails these checks is discarded silently, there is
/// no response channel for indications.
///
/// A DONT-FRAGMENT attribute is preserved: the payload is forwarded
/// unchanged and fragmentation behavior stays with the operating
/// system.
pub async fn process(req: Request<'_>, message: &MessageRef<'_>) -> Result<(), Error> {
    let Some(allocation) = req.env.manager.get_allocation(&req.five_tuple) else {
        log::trace!("send indication without allocation, dropped: src={}", req.src());
        return Ok(());
    };

    let (Some(peer), Some(data)) = (message.get::<XorPeerAddress>(), message.get::<Data>()) else {
        log::trace!("send indication missing peer or data, dropped: src={}", req.src());
        return Ok(());
    };

    if !allocation.permissions().contains(&peer.ip()) {
        log::trace!(
            "send indication without permission, dropped: src={}, peer={}",
            req.src(),
            peer,
        );

        return Ok(());
    }

    allocation.relay(data, peer).await
}
