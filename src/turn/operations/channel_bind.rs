use super::Request;
use crate::stun::{
    attribute::{ChannelNumber, ErrorKind, Software, XorPeerAddress},
    method::{CHANNEL_BIND_REQUEST, CHANNEL_BIND_RESPONSE},
    MessageEncoder, MessageRef,
};
use crate::turn::{Error, SOFTWARE};

/// process channel bind request
///
/// [RFC5766 §11.2](https://tools.ietf.org/html/rfc5766#section-11.2)
///
/// The channel number must lie in 0x4000 through 0x7FFF, and the
/// (number, peer) pair must respect the table invariants: within one
/// allocation a number is bound to one peer and a peer to one number,
/// and neither side may be rebound until the old binding has expired
/// and sat out its quiescence window.  Violations are a 400.
///
/// If the request is valid the server creates or refreshes the channel
/// binding and also installs or refreshes a permission for the peer's
/// IP address, exactly as if a CreatePermission had named it.
/// Retransmitted ChannelBind requests simply refresh both.
pub async fn process(mut req: Request<'_>, message: &MessageRef<'_>) -> Result<(), Error> {
    let Some((username, key)) = req.authenticate(message, CHANNEL_BIND_REQUEST).await? else {
        return Ok(());
    };

    let Some(allocation) = req.env.manager.get_allocation(&req.five_tuple) else {
        return req
            .reject(message, CHANNEL_BIND_REQUEST, ErrorKind::AllocationMismatch, Some(&key))
            .await;
    };

    if allocation.username() != username {
        return req
            .reject(message, CHANNEL_BIND_REQUEST, ErrorKind::WrongCredentials, Some(&key))
            .await;
    }

    let Some(number) = message.get::<ChannelNumber>() else {
        return req
            .reject(message, CHANNEL_BIND_REQUEST, ErrorKind::BadRequest, Some(&key))
            .await;
    };

    if !(0x4000..=0x7FFF).contains(&number) {
        return req
            .reject(message, CHANNEL_BIND_REQUEST, ErrorKind::BadRequest, Some(&key))
            .await;
    }

    let Some(peer) = message.get::<XorPeerAddress>() else {
        return req
            .reject(message, CHANNEL_BIND_REQUEST, ErrorKind::BadRequest, Some(&key))
            .await;
    };

    if !req.env.observer.permit(req.src(), peer.ip()) {
        return req
            .reject(message, CHANNEL_BIND_REQUEST, ErrorKind::Forbidden, Some(&key))
            .await;
    }

    if !allocation
        .channels()
        .bind(number, peer, req.env.options.channel_bind_timeout)
    {
        return req
            .reject(message, CHANNEL_BIND_REQUEST, ErrorKind::BadRequest, Some(&key))
            .await;
    }

    // the implicit permission that rides along with every binding.
    allocation.permissions().insert(peer.ip());
    req.env.observer.channel_bound(req.src(), username, number);

    {
        let mut pack = MessageEncoder::extend(CHANNEL_BIND_RESPONSE, message, req.bytes);
        pack.append::<Software>(SOFTWARE);
        pack.flush(Some(&key))?;
    }

    req.send().await
}
