use super::{requested_lifetime, Request};
use crate::stun::{
    attribute::{ErrorKind, Lifetime, Software},
    method::{REFRESH_REQUEST, REFRESH_RESPONSE},
    MessageEncoder, MessageRef,
};
use crate::turn::{Error, SOFTWARE};

/// process refresh request
///
/// [RFC5766 §7.2](https://tools.ietf.org/html/rfc5766#section-7.2)
///
/// The "desired lifetime" is zero when the request says zero, otherwise
/// the minimum of the requested and the maximum allowed lifetime.  A
/// zero desired lifetime deletes the allocation, anything else slides
/// its expiry.  Either way the response echoes the value granted.
///
/// A Refresh on a five-tuple with no live allocation answers 437, which
/// also covers the retransmitted zero-lifetime Refresh after the
/// deletion went through.
pub async fn process(mut req: Request<'_>, message: &MessageRef<'_>) -> Result<(), Error> {
    let Some((username, key)) = req.authenticate(message, REFRESH_REQUEST).await? else {
        return Ok(());
    };

    let Some(allocation) = req.env.manager.get_allocation(&req.five_tuple) else {
        return req
            .reject(message, REFRESH_REQUEST, ErrorKind::AllocationMismatch, Some(&key))
            .await;
    };

    // all requests after the initial Allocate must use the same
    // username as that used to create the allocation (RFC 5766 §5).
    if allocation.username() != username {
        return req
            .reject(message, REFRESH_REQUEST, ErrorKind::WrongCredentials, Some(&key))
            .await;
    }

    let lifetime = requested_lifetime(message, &req.env.options);
    if lifetime.is_zero() {
        req.env.manager.delete_allocation(&req.five_tuple);
    } else {
        allocation.refresh(lifetime);
    }

    req.env
        .observer
        .refreshed(req.src(), username, lifetime.as_secs() as u32);

    {
        let mut pack = MessageEncoder::extend(REFRESH_RESPONSE, message, req.bytes);
        pack.append::<Lifetime>(lifetime.as_secs() as u32);
        pack.append::<Software>(SOFTWARE);
        pack.flush(Some(&key))?;
    }

    req.send().await
}
