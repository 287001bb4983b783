//! JSON encoding and decoding of routing payloads.

use crate::error::WireError;
use crate::message::{Payload, ECHO, ECHO_RESPONSE, MESSAGE, SEND_ROUTING, WEIGHTS};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::trace;

/// Encode a payload as a single-line JSON object
pub fn encode(payload: &Payload) -> Result<String, WireError> {
    match payload {
        Payload::Echo => tagged(ECHO, &Map::new()),
        Payload::EchoResponse(body) => tagged(ECHO_RESPONSE, body),
        Payload::Weights(body) => tagged(WEIGHTS, body),
        Payload::RoutingTable(body) => tagged(SEND_ROUTING, body),
        Payload::SendRouting(body) => tagged(SEND_ROUTING, body),
        Payload::Message(body) => tagged(MESSAGE, body),
        Payload::Unrecognized { kind } => tagged(kind, &Map::new()),
    }
}

/// Decode a raw transport body into a payload
pub fn decode(raw: &str) -> Result<Payload, WireError> {
    let value: Value = serde_json::from_str(raw)?;
    let Value::Object(object) = value else {
        return Err(WireError::NotAnObject);
    };

    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or(WireError::MissingType)?
        .to_string();

    match kind.as_str() {
        ECHO => Ok(Payload::Echo),
        ECHO_RESPONSE => body(ECHO_RESPONSE, object).map(Payload::EchoResponse),
        WEIGHTS => body(WEIGHTS, object).map(Payload::Weights),
        SEND_ROUTING => {
            // A destination marks a relay; otherwise it is a table advertisement
            if object.contains_key("to") {
                body(SEND_ROUTING, object).map(Payload::SendRouting)
            } else {
                body(SEND_ROUTING, object).map(Payload::RoutingTable)
            }
        }
        MESSAGE => body(MESSAGE, object).map(Payload::Message),
        _ => {
            trace!("Unrecognized payload type '{}'", kind);
            Ok(Payload::Unrecognized { kind })
        }
    }
}

fn tagged<T: Serialize + ?Sized>(kind: &str, body: &T) -> Result<String, WireError> {
    let mut value = serde_json::to_value(body)?;
    let object = value.as_object_mut().ok_or(WireError::NotAnObject)?;
    object.insert("type".to_string(), Value::String(kind.to_string()));
    Ok(serde_json::to_string(&value)?)
}

fn body<T: DeserializeOwned>(kind: &'static str, object: Map<String, Value>) -> Result<T, WireError> {
    serde_json::from_value(Value::Object(object)).map_err(|e| WireError::malformed(kind, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{RoutingTableData, RoutingTableUpdate, SendRouting, WeightsUpdate};
    use crate::node::NodeId;
    use std::collections::BTreeMap;

    #[test]
    fn test_decode_echo_ignores_extra_fields() {
        let payload = decode(r#"{"type": "echo", "from": "A"}"#).unwrap();
        assert_eq!(payload, Payload::Echo);
    }

    #[test]
    fn test_decode_echo_response_without_sender() {
        let payload = decode(r#"{"type": "echo_response"}"#).unwrap();
        match payload {
            Payload::EchoResponse(reply) => assert_eq!(reply.from, None),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_decode_send_routing_with_string_hops() {
        let raw = r#"{"type": "send_routing", "from": "A", "to": "C", "data": "hola" , "hops": "1"}"#;
        match decode(raw).unwrap() {
            Payload::SendRouting(relay) => {
                assert_eq!(relay.from, NodeId::from("A"));
                assert_eq!(relay.to, NodeId::from("C"));
                assert_eq!(relay.data, "hola");
                assert_eq!(relay.hops, 1);
                assert_eq!(relay.message_id, None);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_decode_routing_table_advertisement() {
        let raw = r#"{"type":"send_routing","from":"B","messageId":"x-1",
            "data":{"tableRoutes":{"B":[0.0,"B"],"C":[1.0,"C"]}}}"#;
        match decode(raw).unwrap() {
            Payload::RoutingTable(update) => {
                assert_eq!(update.from, NodeId::from("B"));
                assert_eq!(update.message_id, "x-1");
                assert_eq!(
                    update.data.table_routes.get("C"),
                    Some(&(1.0, NodeId::from("C")))
                );
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_encoded_payloads_carry_type() {
        let mut table = BTreeMap::new();
        table.insert(NodeId::from("B"), 12.5);
        let weights = Payload::Weights(WeightsUpdate {
            table,
            version: 3,
            from: NodeId::from("A"),
        });

        let raw = encode(&weights).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["type"], "weights");
        assert_eq!(value["version"], 3);
        assert_eq!(value["table"]["B"], 12.5);
        assert_eq!(decode(&raw).unwrap(), weights);

        let relay = SendRouting::new(NodeId::from("A"), NodeId::from("B"), "hi").with_message_id("m1");
        let value: Value = serde_json::from_str(&encode(&Payload::SendRouting(relay)).unwrap()).unwrap();
        assert_eq!(value["type"], "send_routing");
        assert_eq!(value["messageId"], "m1");

        let advert = Payload::RoutingTable(RoutingTableUpdate {
            from: NodeId::from("A"),
            message_id: "m2".to_string(),
            data: RoutingTableData::default(),
        });
        let value: Value = serde_json::from_str(&encode(&advert).unwrap()).unwrap();
        assert_eq!(value["type"], "send_routing");
        assert!(value.get("to").is_none());

        assert_eq!(encode(&Payload::Echo).unwrap(), r#"{"type":"echo"}"#);
    }

    #[test]
    fn test_unknown_type_is_unrecognized() {
        let payload = decode(r#"{"type": "presence", "status": "away"}"#).unwrap();
        assert_eq!(payload, Payload::Unrecognized { kind: "presence".to_string() });
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(matches!(decode("not json"), Err(WireError::Json(_))));
        assert!(matches!(decode("[1, 2]"), Err(WireError::NotAnObject)));
        assert!(matches!(decode(r#"{"from": "A"}"#), Err(WireError::MissingType)));
        assert!(matches!(
            decode(r#"{"type": "weights", "table": {}, "from": "A"}"#),
            Err(WireError::Malformed { kind: "weights", .. })
        ));
        assert!(matches!(
            decode(r#"{"type": "send_routing", "from": "A", "to": "B", "data": "x", "hops": "many"}"#),
            Err(WireError::Malformed { kind: "send_routing", .. })
        ));
        assert!(matches!(
            decode(r#"{"type": "send_routing", "from": "A", "messageId": "m"}"#),
            Err(WireError::Malformed { kind: "send_routing", .. })
        ));
    }
}
