use super::Request;
use crate::stun::{
    attribute::{Software, XorMappedAddress},
    method::BINDING_RESPONSE,
    MessageEncoder, MessageRef,
};
use crate::turn::{Error, SOFTWARE};

/// process binding request
///
/// [RFC5389](https://datatracker.ietf.org/doc/html/rfc5389)
///
/// As the Binding request passes through NATs on its way here, each one
/// rewrites the source transport address of the packet.  The server
/// copies the source it observed into an XOR-MAPPED-ADDRESS attribute
/// of the success response; the XOR encoding survives NATs that rewrite
/// binary payloads containing their own public address.  No credentials
/// are required for this method.
pub async fn process(req: Request<'_>, message: &MessageRef<'_>) -> Result<(), Error> {
    {
        let mut pack = MessageEncoder::extend(BINDING_RESPONSE, message, req.bytes);
        pack.append::<XorMappedAddress>(req.five_tuple.src);
        pack.append::<Software>(SOFTWARE);
        pack.flush(None)?;
        pack.fingerprint();
    }

    req.send().await
}
