use crate::{compound, from_binary, to_binary, Compound, List, Value};

fn example_compound() -> Compound {
    compound! {
        "byte" => 123_i8,
        "list_of_int" => List::Int(vec![3, -7, 5]),
        "list_of_string" => List::String(vec![
            "foo".to_owned(),
            "bar".to_owned(),
            "baz".to_owned(),
        ]),
        "string" => "aé日",
        "compound" => compound! {
            "foo" => 1,
            "bar" => 2,
            "baz" => 3,
        },
        "int_array" => vec![5, -9, i32::MIN, 0, i32::MAX],
        "byte_array" => vec![0_i8, 2, 3],
        "long_array" => vec![123_i64, 456, 789],
    }
}

#[test]
fn round_trip() {
    let mut buf = vec![];
    let comp = example_compound();

    to_binary(&comp, &mut buf, "The root name").unwrap();

    let (name, value) = from_binary(&mut buf.as_slice()).unwrap().unwrap();
    assert_eq!(name, "The root name");
    assert_eq!(value.as_compound().unwrap(), &comp);
}

#[test]
fn empty_root_decodes_to_none() {
    let buf = [0u8]; // a lone TAG_End
    assert!(from_binary(&mut &buf[..]).unwrap().is_none());
}

#[test]
fn negative_list_length_is_malformed() {
    // TAG_Compound, empty name, TAG_List field named "x", element tag Int,
    // length -1.
    let mut buf = vec![10, 0, 0];
    buf.extend([9, 0, 1, b'x', 3]);
    buf.extend((-1i32).to_be_bytes());
    assert!(from_binary(&mut buf.as_slice()).is_err());
}

#[test]
fn deeply_nested_compound_decode_does_not_overflow_stack() {
    let mut buf = vec![10, 0, 0]; // root compound, empty name
    let n = 10_000;
    for _ in 0..n {
        buf.extend([10, 0, 1, b'c']); // nested TAG_Compound named "c"
    }
    for _ in 0..n + 1 {
        buf.push(0); // close every nested compound plus the root
    }

    assert!(from_binary(&mut buf.as_slice()).is_err());
}

#[test]
fn modified_utf8_round_trips_surrogate_pairs() {
    let mut buf = vec![];
    let comp = compound! { "emoji" => "\u{1F600}" };
    to_binary(&comp, &mut buf, "").unwrap();

    let (_, value) = from_binary(&mut buf.as_slice()).unwrap().unwrap();
    assert_eq!(
        value.as_compound().unwrap().get("emoji").unwrap().as_str(),
        Some("\u{1F600}")
    );
}
