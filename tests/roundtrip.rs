//! Full-message round-trip: decode-shaped `Message`s, encode them back to
//! bytes with `serialize::encode_message`, and read the bytes back with the
//! same unpackers the deserializer uses, confirming the values survive.

use std::cell::{Cell as StdCell, RefCell};
use std::sync::Arc;

use bufrkit::bitio::BitReader;
use bufrkit::model::{BufrNode, Cell, Field, Message, PackingInfo, Payload, Section, Value};
use bufrkit::serialize::encode_message;
use bufrkit::tables::{DescriptorId, Entry, Unit};
use bufrkit::unpack::{CompressedBitUnpacker, UncompressBitUnpacker, UnpackedValue, Unpacker};

fn element_node(id: u32, info: PackingInfo, index: usize) -> Arc<BufrNode> {
    Arc::new(BufrNode::Valued {
        descriptor: bufrkit::tables::Descriptor {
            id: DescriptorId(id),
            entry: Entry::Name(id.to_string()),
        },
        index,
        packing_info: info,
        min_value: StdCell::new(0),
        nbits_diff: StdCell::new(0),
        members: RefCell::new(Vec::new()),
    })
}

#[test]
fn header_and_uncompressed_payload_round_trip() {
    let mut message = Message::new("<test>");

    let mut section0 = Section::new(0, "indicator section");
    section0.add_field(Field::new("signature", Value::Bytes(b"BUFR".to_vec()), 32));
    section0.add_field(Field::new("total_length", Value::UInt(0), 24));
    section0.add_field(Field::new("edition_number", Value::UInt(4), 8));
    message.sections.push(section0);

    let code_info = PackingInfo { unit: Unit::NonNegCode, scale: 0, refval: 0.0, nbits: 8 };
    let numeric_info = PackingInfo { unit: Unit::Numeric, scale: 1, refval: 0.0, nbits: 12 };

    let cell_a = Cell::new(element_node(1001, code_info, 0), Value::UInt(42));
    let cell_b = Cell::new(element_node(1002, numeric_info, 1), Value::Float(12.3));
    let root = Arc::new(BufrNode::Valueless {
        descriptor: bufrkit::tables::Descriptor::root(),
        members: RefCell::new(vec![cell_a.node.clone(), cell_b.node.clone()]),
    });

    let mut payload = Payload { subsets: Vec::new(), compressed: false };
    payload.add_subset(root, vec![cell_a, cell_b]);

    let mut section4 = Section::new(4, "data section");
    section4.add_field(Field::payload("data", Arc::new(payload)));
    message.sections.push(section4);

    let bytes = encode_message(&message).unwrap();
    // 4 (signature) + 3 (total_length) + 1 (edition) = 8 header bytes, then payload bits.
    assert_eq!(&bytes[0..4], b"BUFR");
    assert_eq!(bytes[7], 4);

    let mut reader = BitReader::new(std::io::Cursor::new(bytes[8..].to_vec()));
    let mut unpacker = UncompressBitUnpacker { reader: &mut reader };
    match unpacker.unpack(&code_info).unwrap() {
        UnpackedValue::Single(Value::UInt(v)) => assert_eq!(v, 42),
        _ => panic!("expected an unsigned scalar"),
    }
    match unpacker.unpack(&numeric_info).unwrap() {
        UnpackedValue::Single(Value::Float(v)) => assert!((v - 12.3).abs() < 1e-9),
        _ => panic!("expected a scaled float"),
    }
}

#[test]
fn compressed_payload_round_trips_across_subsets() {
    let numeric_info = PackingInfo { unit: Unit::Numeric, scale: 0, refval: 0.0, nbits: 8 };
    let node = element_node(1003, numeric_info, 0);

    let values = [Value::Float(10.0), Value::Float(13.0), Value::Float(11.0)];
    let mut subset_cells: Vec<Vec<Cell>> = values
        .iter()
        .map(|v| vec![Cell::new(node.clone(), v.clone())])
        .collect();

    let mut payload = Payload { subsets: Vec::new(), compressed: true };
    for cells in subset_cells.drain(..) {
        let root = Arc::new(BufrNode::Valueless {
            descriptor: bufrkit::tables::Descriptor::root(),
            members: RefCell::new(vec![node.clone()]),
        });
        payload.add_subset(root, cells);
    }

    let mut section4 = Section::new(4, "data section");
    section4.add_field(Field::payload("data", Arc::new(payload)));
    let mut message = Message::new("<test>");
    message.sections.push(section4);

    let bytes = encode_message(&message).unwrap();
    let mut reader = BitReader::new(std::io::Cursor::new(bytes));
    let mut unpacker = CompressedBitUnpacker { reader: &mut reader, nsubsets: 3 };
    match unpacker.unpack(&numeric_info).unwrap() {
        UnpackedValue::Compressed(cv) => {
            let floats: Vec<f64> = cv.values.iter().map(|v| v.as_float().unwrap()).collect();
            assert!((floats[0] - 10.0).abs() < 1e-9);
            assert!((floats[1] - 13.0).abs() < 1e-9);
            assert!((floats[2] - 11.0).abs() < 1e-9);
        }
        _ => panic!("expected a compressed result"),
    }
}
