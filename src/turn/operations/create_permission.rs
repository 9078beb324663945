use std::net::SocketAddr;

use super::Request;
use crate::stun::{
    attribute::{ErrorKind, Software, XorPeerAddress},
    method::{CREATE_PERMISSION_REQUEST, CREATE_PERMISSION_RESPONSE},
    MessageEncoder, MessageRef,
};
use crate::turn::{Error, SOFTWARE};

/// process create permission request
///
/// [RFC5766 §9.2](https://tools.ietf.org/html/rfc5766#section-9.2)
///
/// The CreatePermission request MUST contain at least one
/// XOR-PEER-ADDRESS attribute and MAY contain multiple such attributes.
/// If no such attribute exists, or if any of these attributes are
/// invalid, then a 400 (Bad Request) error is returned.
///
/// The server MAY impose restrictions on the IP address allowed in the
/// XOR-PEER-ADDRESS attribute; if a value is not allowed, the server
/// rejects the request with a 403 (Forbidden) error.  The restriction
/// runs through the embedder's permission predicate here, and it is
/// all-or-nothing: one rejected peer rejects the request and installs
/// nothing.
///
/// If the message is valid, the server installs or refreshes a
/// permission for the IP address contained in each XOR-PEER-ADDRESS
/// attribute.  The port portion of each attribute is ignored.
/// Retransmitted CreatePermission requests simply refresh the
/// permissions.
pub async fn process(mut req: Request<'_>, message: &MessageRef<'_>) -> Result<(), Error> {
    let Some((username, key)) = req.authenticate(message, CREATE_PERMISSION_REQUEST).await? else {
        return Ok(());
    };

    let Some(allocation) = req.env.manager.get_allocation(&req.five_tuple) else {
        return req
            .reject(message, CREATE_PERMISSION_REQUEST, ErrorKind::AllocationMismatch, Some(&key))
            .await;
    };

    if allocation.username() != username {
        return req
            .reject(message, CREATE_PERMISSION_REQUEST, ErrorKind::WrongCredentials, Some(&key))
            .await;
    }

    let peers: Vec<SocketAddr> = message.get_all::<XorPeerAddress>().collect();
    if peers.is_empty() {
        return req
            .reject(message, CREATE_PERMISSION_REQUEST, ErrorKind::BadRequest, Some(&key))
            .await;
    }

    for peer in &peers {
        if !req.env.observer.permit(req.src(), peer.ip()) {
            return req
                .reject(message, CREATE_PERMISSION_REQUEST, ErrorKind::Forbidden, Some(&key))
                .await;
        }
    }

    for peer in &peers {
        allocation.permissions().insert(peer.ip());
        req.env
            .observer
            .permission_created(req.src(), username, peer.ip());
    }

    {
        let mut pack = MessageEncoder::extend(CREATE_PERMISSION_RESPONSE, message, req.bytes);
        pack.append::<Software>(SOFTWARE);
        pack.flush(Some(&key))?;
    }

    req.send().await
}
