//! Generated protobuf messages and gRPC client for the tablet manager
//! service, compiled from `specs/v1`.

/// Topology types (tablet aliases, tablet records).
pub mod topodata {
    tonic::include_proto!("topodata");
}

/// Structured log events relayed from long-running remote actions.
pub mod logutil {
    tonic::include_proto!("logutil");
}

/// Request and response payloads of the tablet manager service.
pub mod tabletmanagerdata {
    tonic::include_proto!("tabletmanagerdata");
}

/// The `TabletManager` service client.
pub mod tabletmanagerservice {
    tonic::include_proto!("tabletmanagerservice");
}

#[cfg(test)]
mod tests {
    use super::tabletmanagerdata as pb;
    use super::*;
    use prost::Message;

    #[test]
    fn test_empty_message_encodes_to_nothing() {
        assert!(pb::SetReadOnlyRequest {}.encode_to_vec().is_empty());
        assert!(pb::ScrapRequest {}.encode_to_vec().is_empty());
    }

    #[test]
    fn test_enum_conversion() {
        assert_eq!(
            topodata::TabletType::try_from(2).unwrap(),
            topodata::TabletType::Primary
        );
        assert!(topodata::TabletType::try_from(99).is_err());

        let req = pb::ChangeTypeRequest {
            tablet_type: topodata::TabletType::Rdonly as i32,
        };
        let decoded = pb::ChangeTypeRequest::decode(req.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.tablet_type(), topodata::TabletType::Rdonly);
    }

    #[test]
    fn test_reserved_word_fields() {
        let table = pb::TableDefinition {
            name: "users".into(),
            r#type: "BASE TABLE".into(),
            ..Default::default()
        };
        let decoded = pb::TableDefinition::decode(table.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.r#type, "BASE TABLE");
    }
}
