//! Conversions between client-facing records and the logic service's RPC
//! records.
//!
//! Nested address, dock and boat records are rebuilt field by field. Absent
//! sub-records on the RPC side decode to defaults. A record's kind is fixed by
//! the stream it arrived on, so records bound for clients get their
//! `MessageType` from that kind rather than from the RPC record.

use riden_gateway::ALL_CLIENTS;

use crate::error::DispatchError;
use crate::message::{self, ApiMessage, ClientData, ConnType, Routed};
use crate::proto;

impl From<message::Address> for proto::Address {
    fn from(value: message::Address) -> Self {
        Self {
            number: value.number,
            street: value.street,
        }
    }
}

impl From<proto::Address> for message::Address {
    fn from(value: proto::Address) -> Self {
        Self {
            number: value.number,
            street: value.street,
        }
    }
}

impl From<message::Dock> for proto::Dock {
    fn from(value: message::Dock) -> Self {
        Self {
            address: Some(value.address.into()),
            gangway: value.gangway,
        }
    }
}

impl From<proto::Dock> for message::Dock {
    fn from(value: proto::Dock) -> Self {
        Self {
            address: value.address.map(Into::into).unwrap_or_default(),
            gangway: value.gangway,
        }
    }
}

impl From<message::Boat> for proto::Boat {
    fn from(value: message::Boat) -> Self {
        Self {
            boat_id: value.boat_id,
            name: value.name,
        }
    }
}

impl From<proto::Boat> for message::Boat {
    fn from(value: proto::Boat) -> Self {
        Self {
            boat_id: value.boat_id,
            name: value.name,
        }
    }
}

impl From<ClientData> for proto::ClientData {
    fn from(value: ClientData) -> Self {
        Self {
            conn_name: value.conn_name,
            conn_type: value.conn_type.as_str().to_owned(),
        }
    }
}

impl From<proto::ClientData> for ClientData {
    fn from(value: proto::ClientData) -> Self {
        Self {
            conn_name: value.conn_name,
            conn_type: ConnType::from(value.conn_type),
        }
    }
}

fn sub<P, M: From<P> + Default>(value: Option<P>) -> M {
    value.map(Into::into).unwrap_or_default()
}

impl From<Routed<message::ReserveTrip>> for proto::ReserveTripMessage {
    fn from(Routed { client, message }: Routed<message::ReserveTrip>) -> Self {
        Self {
            api_message: Some(proto::ReserveTripApiMessage {
                message_type: message.message_type,
                auth_token: message.auth_token,
                client_id: message.client_id,
                source_dock: Some(message.source_dock.into()),
                destination_dock: Some(message.destination_dock.into()),
            }),
            client_data: Some(client.into()),
        }
    }
}

impl From<Routed<message::AtDock>> for proto::AtDockMessage {
    fn from(Routed { client, message }: Routed<message::AtDock>) -> Self {
        Self {
            api_message: Some(proto::AtDockApiMessage {
                message_type: message.message_type,
                client_id: message.client_id,
                boat: Some(message.boat.into()),
                dock: Some(message.dock.into()),
                transaction_id: message.transaction_id,
            }),
            client_data: Some(client.into()),
        }
    }
}

impl From<Routed<message::OnBoat>> for proto::OnBoatMessage {
    fn from(Routed { client, message }: Routed<message::OnBoat>) -> Self {
        Self {
            api_message: Some(proto::OnBoatApiMessage {
                message_type: message.message_type,
                client_id: message.client_id,
                boat: Some(message.boat.into()),
                transaction_id: message.transaction_id,
            }),
            client_data: Some(client.into()),
        }
    }
}

impl From<Routed<message::OffBoat>> for proto::OffBoatMessage {
    fn from(Routed { client, message }: Routed<message::OffBoat>) -> Self {
        Self {
            api_message: Some(proto::OffBoatApiMessage {
                message_type: message.message_type,
                client_id: message.client_id,
                boat: Some(message.boat.into()),
                transaction_id: message.transaction_id,
            }),
            client_data: Some(client.into()),
        }
    }
}

impl From<proto::AckMessage> for Routed<message::Ack> {
    fn from(value: proto::AckMessage) -> Self {
        let api = value.api_message.unwrap_or_default();
        Routed::new(
            sub(value.client_data),
            message::Ack {
                message_type: message::Ack::KIND.as_str().to_owned(),
                client_id: api.client_id,
                is_reserved: api.is_reserved,
                boat: sub(api.boat),
                transaction_id: api.transaction_id,
            },
        )
    }
}

/// Boat status is always sent to every client, whatever the record's
/// client data says.
impl From<proto::BoatStatusMessage> for Routed<message::BoatStatus> {
    fn from(value: proto::BoatStatusMessage) -> Self {
        let api = value.api_message.unwrap_or_default();
        Routed::new(
            ClientData::all(),
            message::BoatStatus {
                message_type: message::BoatStatus::KIND.as_str().to_owned(),
                boat: sub(api.boat),
                service_state: api.service_state,
                previous_dock: sub(api.previous_dock),
                current_dock: sub(api.current_dock),
                next_dock: sub(api.next_dock),
            },
        )
    }
}

impl From<proto::ArrivedMessage> for Routed<message::Arrived> {
    fn from(value: proto::ArrivedMessage) -> Self {
        let api = value.api_message.unwrap_or_default();
        Routed::new(
            sub(value.client_data),
            message::Arrived {
                message_type: message::Arrived::KIND.as_str().to_owned(),
                client_id: api.client_id,
                boat: sub(api.boat),
                dock: sub(api.dock),
                transaction_id: api.transaction_id,
            },
        )
    }
}

/// The gateway connection name a record should be delivered to.
///
/// `all` maps to the broadcast name regardless of the record's connection
/// name; `websocket` uses the connection name as is.
pub fn resolve_target(client: &ClientData) -> Result<String, DispatchError> {
    match &client.conn_type {
        ConnType::All => Ok(ALL_CLIENTS.to_owned()),
        ConnType::WebSocket => Ok(client.conn_name.clone()),
        ConnType::Other(other) => Err(DispatchError::UnknownConnType(other.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::gangway;

    fn dock(number: i32, street: &str, gangway: &str) -> message::Dock {
        message::Dock {
            address: message::Address {
                number,
                street: street.to_string(),
            },
            gangway: gangway.to_string(),
        }
    }

    fn proto_boat() -> proto::Boat {
        proto::Boat {
            boat_id: 911,
            name: "testBoat".to_string(),
        }
    }

    #[test]
    fn test_reserve_trip_to_rpc() {
        let trip = message::ReserveTrip {
            message_type: "reserveTrip".to_string(),
            auth_token: "testToken".to_string(),
            client_id: "testClient".to_string(),
            source_dock: dock(901, "testAvenue", gangway::FORE),
            destination_dock: dock(991, "testBlvd", gangway::AFT),
        };

        let rpc = proto::ReserveTripMessage::from(Routed::new(
            ClientData::websocket("testClientConnName"),
            trip,
        ));

        let client = rpc.client_data.unwrap();
        assert_eq!(client.conn_name, "testClientConnName");
        assert_eq!(client.conn_type, "websocket");

        let api = rpc.api_message.unwrap();
        assert_eq!(api.auth_token, "testToken");
        assert_eq!(api.client_id, "testClient");
        let source = api.source_dock.unwrap();
        assert_eq!(source.gangway, "fore");
        assert_eq!(source.address.unwrap().street, "testAvenue");
        assert_eq!(api.destination_dock.unwrap().address.unwrap().number, 991);
    }

    #[test]
    fn test_ack_from_rpc() {
        let rpc = proto::AckMessage {
            api_message: Some(proto::AckApiMessage {
                message_type: "ack".to_string(),
                client_id: "testClient".to_string(),
                is_reserved: true,
                boat: Some(proto_boat()),
                transaction_id: "917K-956B".to_string(),
            }),
            client_data: Some(proto::ClientData {
                conn_name: "testClientConnName".to_string(),
                conn_type: "websocket".to_string(),
            }),
        };

        let routed = Routed::<message::Ack>::from(rpc);
        assert_eq!(routed.client, ClientData::websocket("testClientConnName"));
        assert!(routed.message.is_reserved);
        assert_eq!(routed.message.boat.name, "testBoat");
        assert_eq!(routed.message.transaction_id, "917K-956B");
        assert_eq!(resolve_target(&routed.client).unwrap(), "testClientConnName");
    }

    #[test]
    fn test_boat_status_always_broadcast() {
        let rpc = proto::BoatStatusMessage {
            api_message: Some(proto::BoatStatusApiMessage {
                message_type: "boatStatus".to_string(),
                boat: Some(proto_boat()),
                service_state: proto::ServiceState::Delayed as i32,
                previous_dock: None,
                current_dock: None,
                next_dock: None,
            }),
            client_data: Some(proto::ClientData {
                conn_name: "testClientConnName".to_string(),
                conn_type: "websocket".to_string(),
            }),
        };

        let routed = Routed::<message::BoatStatus>::from(rpc);
        assert_eq!(resolve_target(&routed.client).unwrap(), ALL_CLIENTS);
        assert_eq!(
            routed.message.service_state,
            crate::message::service_state::DELAYED
        );
        assert_eq!(routed.message.current_dock, message::Dock::default());
    }

    fn message_boat() -> message::Boat {
        message::Boat {
            boat_id: 911,
            name: "testBoat".to_string(),
        }
    }

    #[test]
    fn test_at_dock_to_rpc() {
        let at_dock = message::AtDock {
            message_type: "atDock".to_string(),
            client_id: "testClient".to_string(),
            boat: message_boat(),
            dock: dock(901, "testAvenue", gangway::FORE),
            transaction_id: "917K-956B".to_string(),
        };

        let rpc = proto::AtDockMessage::from(Routed::new(
            ClientData::websocket("testClientConnName"),
            at_dock,
        ));

        assert_eq!(rpc.client_data.unwrap().conn_name, "testClientConnName");
        let api = rpc.api_message.unwrap();
        assert_eq!(api.message_type, "atDock");
        assert_eq!(api.client_id, "testClient");
        assert_eq!(api.boat, Some(proto_boat()));
        let dock = api.dock.unwrap();
        assert_eq!(dock.gangway, "fore");
        assert_eq!(dock.address.unwrap().number, 901);
        assert_eq!(api.transaction_id, "917K-956B");
    }

    #[test]
    fn test_on_boat_to_rpc() {
        let on_boat = message::OnBoat {
            message_type: "onBoat".to_string(),
            client_id: "testClient".to_string(),
            boat: message_boat(),
            transaction_id: "917K-956B".to_string(),
        };

        let rpc = proto::OnBoatMessage::from(Routed::new(
            ClientData::websocket("testClientConnName"),
            on_boat,
        ));

        let client = rpc.client_data.unwrap();
        assert_eq!(client.conn_type, "websocket");
        let api = rpc.api_message.unwrap();
        assert_eq!(api.message_type, "onBoat");
        assert_eq!(api.boat, Some(proto_boat()));
        assert_eq!(api.transaction_id, "917K-956B");
    }

    #[test]
    fn test_off_boat_to_rpc() {
        let off_boat = message::OffBoat {
            message_type: "offBoat".to_string(),
            client_id: "testClient".to_string(),
            boat: message_boat(),
            transaction_id: "917K-956B".to_string(),
        };

        let rpc = proto::OffBoatMessage::from(Routed::new(
            ClientData::websocket("testClientConnName"),
            off_boat,
        ));

        assert_eq!(rpc.client_data.unwrap().conn_name, "testClientConnName");
        let api = rpc.api_message.unwrap();
        assert_eq!(api.message_type, "offBoat");
        assert_eq!(api.client_id, "testClient");
        assert_eq!(api.boat, Some(proto_boat()));
    }

    #[test]
    fn test_arrived_from_rpc() {
        let rpc = proto::ArrivedMessage {
            api_message: Some(proto::ArrivedApiMessage {
                message_type: "arrived".to_string(),
                client_id: "testClient".to_string(),
                boat: Some(proto_boat()),
                dock: Some(proto::Dock {
                    address: Some(proto::Address {
                        number: 991,
                        street: "testBlvd".to_string(),
                    }),
                    gangway: "aft".to_string(),
                }),
                transaction_id: "917K-956B".to_string(),
            }),
            client_data: Some(proto::ClientData {
                conn_name: "testClientConnName".to_string(),
                conn_type: "websocket".to_string(),
            }),
        };

        let routed = Routed::<message::Arrived>::from(rpc);
        assert_eq!(routed.client, ClientData::websocket("testClientConnName"));
        assert_eq!(routed.message.dock, dock(991, "testBlvd", gangway::AFT));
        assert_eq!(routed.message.boat, message_boat());
        assert_eq!(routed.message.transaction_id, "917K-956B");
    }

    #[test]
    fn test_kind_comes_from_stream_not_record() {
        let ack = Routed::<message::Ack>::from(proto::AckMessage {
            api_message: Some(proto::AckApiMessage::default()),
            client_data: None,
        });
        assert_eq!(ack.message.message_type, "ack");

        let status = Routed::<message::BoatStatus>::from(proto::BoatStatusMessage {
            api_message: Some(proto::BoatStatusApiMessage {
                message_type: "arrived".to_string(),
                ..Default::default()
            }),
            client_data: None,
        });
        assert_eq!(status.message.message_type, "boatStatus");

        let arrived = Routed::<message::Arrived>::from(proto::ArrivedMessage {
            api_message: None,
            client_data: None,
        });
        assert_eq!(arrived.message.message_type, "arrived");
    }

    #[test]
    fn test_all_rewrites_conn_name() {
        let client = ClientData {
            conn_name: "someone".to_string(),
            conn_type: ConnType::All,
        };
        assert_eq!(resolve_target(&client).unwrap(), ALL_CLIENTS);
    }

    #[test]
    fn test_unknown_conn_type_unroutable() {
        let routed = Routed::<message::Arrived>::from(proto::ArrivedMessage {
            api_message: None,
            client_data: Some(proto::ClientData {
                conn_name: "c".to_string(),
                conn_type: "smoke-signal".to_string(),
            }),
        });
        assert_eq!(
            resolve_target(&routed.client),
            Err(DispatchError::UnknownConnType("smoke-signal".to_string()))
        );
    }
}
