use super::{requested_lifetime, Request};
use crate::stun::{
    attribute::{
        DontFragment, ErrorKind, EvenPort, Lifetime, RequestedTransport, ReservationToken,
        Software, XorMappedAddress, XorRelayedAddress, TRANSPORT_UDP,
    },
    method::{ALLOCATE_REQUEST, ALLOCATE_RESPONSE},
    MessageEncoder, MessageRef,
};
use crate::turn::{Error, SOFTWARE};

/// process allocate request
///
/// [RFC5766 §6.2](https://tools.ietf.org/html/rfc5766#section-6.2)
///
/// The server checks, in order: that the request authenticates under
/// the long-term credential mechanism; that the 5-tuple is not already
/// taken by a live allocation (437); that REQUESTED-TRANSPORT is
/// present and names UDP (442 otherwise); that DONT-FRAGMENT is absent,
/// since this server does not implement it and it is comprehension
/// required (420); and that EVEN-PORT and RESERVATION-TOKEN are not
/// both present (400).
///
/// The lifetime is the minimum of the requested value and the server
/// maximum, one hour by default.  The success response carries
/// XOR-RELAYED-ADDRESS, XOR-MAPPED-ADDRESS and LIFETIME and is signed
/// with the key that authenticated the request.
pub async fn process(mut req: Request<'_>, message: &MessageRef<'_>) -> Result<(), Error> {
    let Some((username, key)) = req.authenticate(message, ALLOCATE_REQUEST).await? else {
        return Ok(());
    };

    if req.env.manager.get_allocation(&req.five_tuple).is_some() {
        return req
            .reject(message, ALLOCATE_REQUEST, ErrorKind::AllocationMismatch, Some(&key))
            .await;
    }

    let Some(transport) = message.get::<RequestedTransport>() else {
        return req
            .reject(message, ALLOCATE_REQUEST, ErrorKind::BadRequest, Some(&key))
            .await;
    };

    if transport != TRANSPORT_UDP {
        return req
            .reject(message, ALLOCATE_REQUEST, ErrorKind::UnsupportedTransport, Some(&key))
            .await;
    }

    if message.get::<DontFragment>().is_some() {
        return req
            .reject(message, ALLOCATE_REQUEST, ErrorKind::UnknownAttribute, Some(&key))
            .await;
    }

    let even_port = message.get::<EvenPort>();
    let reservation = message.get::<ReservationToken>();
    if even_port.is_some() && reservation.is_some() {
        return req
            .reject(message, ALLOCATE_REQUEST, ErrorKind::BadRequest, Some(&key))
            .await;
    }

    let requested_port = match reservation {
        None => 0,
        Some(token) => match req.env.manager.take_reservation(token) {
            Some(port) => port,
            None => {
                return req
                    .reject(message, ALLOCATE_REQUEST, ErrorKind::BadRequest, Some(&key))
                    .await;
            }
        },
    };

    let lifetime = requested_lifetime(message, &req.env.options);

    let allocation = match req
        .env
        .manager
        .create_allocation(
            req.five_tuple,
            req.conn.clone(),
            username,
            key,
            lifetime,
            req.external.ip(),
            requested_port,
            even_port,
        )
        .await
    {
        Ok(allocation) => allocation,
        Err(Error::AllocationMismatch) => {
            return req
                .reject(message, ALLOCATE_REQUEST, ErrorKind::AllocationMismatch, Some(&key))
                .await;
        }
        Err(Error::InsufficientCapacity) => {
            return req
                .reject(message, ALLOCATE_REQUEST, ErrorKind::InsufficientCapacity, Some(&key))
                .await;
        }
        Err(e) => return Err(e),
    };

    req.env
        .observer
        .allocated(req.src(), username, allocation.relay_addr().port());

    {
        let mut pack = MessageEncoder::extend(ALLOCATE_RESPONSE, message, req.bytes);
        pack.append::<XorRelayedAddress>(allocation.relay_addr());
        pack.append::<XorMappedAddress>(req.five_tuple.src);
        pack.append::<Lifetime>(lifetime.as_secs() as u32);
        if let Some(token) = allocation.reservation_token() {
            pack.append::<ReservationToken>(token);
        }

        pack.append::<Software>(SOFTWARE);
        pack.flush(Some(&key))?;
    }

    req.send().await
}
