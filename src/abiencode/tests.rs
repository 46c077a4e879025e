use super::*;
use serde::Serialize;
use types::{Address, U256};

/// Splits the expected output into 32 byte slots. Each line starts with a slot
/// as hex (no 0x), anything after it explains what the slot is.
fn expected_bytes(expected: &str) -> Vec<u8> {
    expected
        .lines()
        .filter(|line| !line.trim().is_empty())
        .flat_map(|line| {
            let slot = line.trim();
            assert!(
                slot.len() >= 64,
                "expected line is too short, it must start with a 32 byte hex string!"
            );
            hex::decode(&slot[..64]).unwrap()
        })
        .collect()
}

fn assert_slots(actual: &[u8], expected: &str) {
    let expected = expected_bytes(expected);
    assert_eq!(actual.len() % 32, 0, "output is not slot aligned");
    for (i, (a, e)) in actual.chunks(32).zip(expected.chunks(32)).enumerate() {
        assert_eq!(hex::encode(a), hex::encode(e), "slot {} did not match", i);
    }
    assert_eq!(actual.len(), expected.len(), "number of slots differs");
}

fn serialize_and_compare<T>(value: &T, expected: &str)
where
    T: Serialize,
{
    let encoded = encode(&to_value(value).unwrap()).unwrap();
    assert_slots(&encoded, expected);
}

fn serialize_and_compare_fnargs<T>(value: &T, expected: &str)
where
    T: Serialize,
{
    let encoded = match to_value(value).unwrap() {
        Value::Tuple(items) => encode_params(&items),
        other => encode_params(core::slice::from_ref(&other)),
    }
    .unwrap();
    assert_slots(&encoded, expected);
}

fn etherscan_address() -> Address {
    // Random address from etherscan, do not use!
    "95222290DD7278Aa3Ddd389Cc1E1d165CC4BAfe5".parse().unwrap()
}

#[derive(Serialize, Debug)]
#[serde(transparent)]
struct Bytes {
    #[serde(with = "as_bytes")]
    value: [u8; 4],
}

#[derive(Serialize, Debug)]
struct BytesContainer(#[serde(with = "as_bytes")] [u8; 4]);

fn gen(base: u8) -> [u8; 4] {
    [0x01 | base, 0x02 | base, 0x03 | base, 0x04 | base]
}

#[test]
fn u64() {
    /*
    uint64 d = 0x1337000012341111;
    return abi.encode(d);
    */
    let d: u64 = 0x1337000012341111;
    serialize_and_compare(
        &d,
        "0000000000000000000000000000000000000000000000001337000012341111",
    )
}

#[test]
fn negative_int() {
    serialize_and_compare(
        &-2i64,
        "fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffe",
    )
}

#[test]
fn address_in_function_args() {
    serialize_and_compare_fnargs(
        &etherscan_address(),
        "00000000000000000000000095222290dd7278aa3ddd389cc1e1d165cc4bafe5",
    )
}

#[test]
fn address_in_container() {
    #[derive(Serialize, Debug)]
    struct AddrContainer {
        a: Address,
    }

    // Not a dynamic type => No 0x0000..0020 added in the beginning.
    serialize_and_compare(
        &AddrContainer {
            a: etherscan_address(),
        },
        "00000000000000000000000095222290dd7278aa3ddd389cc1e1d165cc4bafe5",
    )
}

#[test]
fn bytes() {
    /*
    bytes memory d = "\xa1\xa2\xa3\xa4";
    return abi.encode(d);
    */
    let expected = "
0000000000000000000000000000000000000000000000000000000000000020
0000000000000000000000000000000000000000000000000000000000000004
a1a2a3a400000000000000000000000000000000000000000000000000000000
    ";
    serialize_and_compare(&Bytes { value: gen(0xa0) }, expected);
}

#[test]
fn bytes_zerolen() {
    #[derive(Serialize, Debug)]
    #[serde(transparent)]
    struct Empty(#[serde(with = "as_bytes")] Vec<u8>);

    let expected = "
0000000000000000000000000000000000000000000000000000000000000020
0000000000000000000000000000000000000000000000000000000000000000
    ";
    serialize_and_compare(&Empty(vec![]), expected);
}

#[test]
fn bytes_container() {
    /*
    struct BytesContainerData { bytes a; }
    d.a = "\xa1\xa2\xa3\xa4";
    return abi.encode(d);
    */
    let expected = "
0000000000000000000000000000000000000000000000000000000000000020 // d offset
    0000000000000000000000000000000000000000000000000000000000000020 // d.a offset
        0000000000000000000000000000000000000000000000000000000000000004 // d.a length
        a1a2a3a400000000000000000000000000000000000000000000000000000000 // d.a
    ";
    serialize_and_compare(&BytesContainer(gen(0xa0)), expected);
}

// The following tests come from the solidity documentation:
// https://docs.soliditylang.org/en/v0.8.17/abi-spec.html#examples
//
// The docs explain function arguments, which do not include the 0x20 offset
// of structs, therefore we use serialize_and_compare_fnargs.

#[test]
fn foo_baz() {
    #[derive(Serialize, Debug)]
    struct Baz(u32, bool);

    let expected = "
0000000000000000000000000000000000000000000000000000000000000045
0000000000000000000000000000000000000000000000000000000000000001
    ";
    serialize_and_compare(&Baz(69, true), expected);
}

#[test]
fn foo_baz_return() {
    serialize_and_compare_fnargs(
        &true,
        "0000000000000000000000000000000000000000000000000000000000000001",
    );
    serialize_and_compare_fnargs(
        &false,
        "0000000000000000000000000000000000000000000000000000000000000000",
    );
}

#[test]
fn foo_bar() {
    // bar(bytes3[2])
    let d = Value::Tuple(vec![Value::Tuple(vec![
        Value::FixedBytes(b"abc".to_vec()),
        Value::FixedBytes(b"def".to_vec()),
    ])]);

    let expected = "
6162630000000000000000000000000000000000000000000000000000000000
6465660000000000000000000000000000000000000000000000000000000000
    ";
    serialize_and_compare_fnargs(&d, expected);
}

mod foo_sam {
    use super::*;

    const EXPECTED: &str = "
0000000000000000000000000000000000000000000000000000000000000060 // [0] (bytes) offset
0000000000000000000000000000000000000000000000000000000000000001 // [1] (bool)
00000000000000000000000000000000000000000000000000000000000000a0 // [2] (uint[]) offset
    0000000000000000000000000000000000000000000000000000000000000004 // [0] (bytes) length
    6461766500000000000000000000000000000000000000000000000000000000 // [0] (bytes)

    0000000000000000000000000000000000000000000000000000000000000003 // [2] (uint[]) length
    0000000000000000000000000000000000000000000000000000000000000001 // [2][0]
    0000000000000000000000000000000000000000000000000000000000000002 // [2][1]
    0000000000000000000000000000000000000000000000000000000000000003 // [2][2]
    ";

    #[test]
    fn via_array() {
        #[derive(Serialize, Debug)]
        struct Sam(
            #[serde(with = "as_bytes")] [u8; 4],
            bool,
            #[serde(with = "as_dyn_array")] [u64; 3],
        );

        serialize_and_compare_fnargs(&Sam(*b"dave", true, [1, 2, 3]), EXPECTED);
    }

    #[test]
    fn no_restrictions() {
        #[derive(Serialize, Debug)]
        struct Sam(#[serde(with = "as_bytes")] Vec<u8>, bool, Vec<U256>);

        let d = Sam(b"dave".to_vec(), true, vec![1.into(), 2.into(), 3.into()]);
        serialize_and_compare_fnargs(&d, EXPECTED);
    }

    #[test]
    fn decode_back() {
        let ty: AbiType = "(bytes,bool,uint256[])".parse().unwrap();
        let bytes = expected_bytes(EXPECTED);
        // Function args are a tuple without the leading offset, so decode them
        // as a static head starting at 0.
        let mut framed = expected_bytes(
            "0000000000000000000000000000000000000000000000000000000000000020",
        );
        framed.extend_from_slice(&bytes);

        let value = decode(&framed, &ty).unwrap();
        assert_eq!(
            value,
            Value::Tuple(vec![
                Value::Bytes(b"dave".to_vec()),
                Value::Bool(true),
                Value::Array(vec![1u64.into(), 2u64.into(), 3u64.into()]),
            ])
        );
    }
}

const DYNAMICTYPES_G: &str = "
0000000000000000000000000000000000000000000000000000000000000040 // offset of [[1, 2], [3]]
0000000000000000000000000000000000000000000000000000000000000140 // offset of [\"one\", \"two\", \"three\"]
    0000000000000000000000000000000000000000000000000000000000000002 // count for [[1, 2], [3]]
    0000000000000000000000000000000000000000000000000000000000000040 // offset of [1, 2]
    00000000000000000000000000000000000000000000000000000000000000a0 // offset of [3]
        0000000000000000000000000000000000000000000000000000000000000002 // count for [1, 2]
        0000000000000000000000000000000000000000000000000000000000000001 // encoding of 1
        0000000000000000000000000000000000000000000000000000000000000002 // encoding of 2

        0000000000000000000000000000000000000000000000000000000000000001 // count for [3]
        0000000000000000000000000000000000000000000000000000000000000003 // encoding of 3

    0000000000000000000000000000000000000000000000000000000000000003 // count for [\"one\", \"two\", \"three\"]
    0000000000000000000000000000000000000000000000000000000000000060 // offset for \"one\"
    00000000000000000000000000000000000000000000000000000000000000a0 // offset for \"two\"
    00000000000000000000000000000000000000000000000000000000000000e0 // offset for \"three\"
        0000000000000000000000000000000000000000000000000000000000000003 // count for \"one\"
        6f6e650000000000000000000000000000000000000000000000000000000000 // encoding of \"one\"

        0000000000000000000000000000000000000000000000000000000000000003 // count for \"two\"
        74776f0000000000000000000000000000000000000000000000000000000000 // encoding of \"two\"

        0000000000000000000000000000000000000000000000000000000000000005 // count for \"three\"
        7468726565000000000000000000000000000000000000000000000000000000 // encoding of \"three\"
";

#[test]
fn dynamictypes_f() {
    // f(uint256,uint32[],bytes10,bytes)
    let d = Value::Tuple(vec![
        Value::Uint(0x123.into()),
        Value::Array(vec![0x456u64.into(), 0x789u64.into()]),
        Value::FixedBytes(b"1234567890".to_vec()),
        Value::Bytes(b"Hello, world!".to_vec()),
    ]);

    let expected = "
0000000000000000000000000000000000000000000000000000000000000123 // [0]
0000000000000000000000000000000000000000000000000000000000000080 // [1] offset
3132333435363738393000000000000000000000000000000000000000000000 // [2]
00000000000000000000000000000000000000000000000000000000000000e0 // [3] offset
    0000000000000000000000000000000000000000000000000000000000000002 // [1] length
    0000000000000000000000000000000000000000000000000000000000000456 // [1][0]
    0000000000000000000000000000000000000000000000000000000000000789 // [1][1]

    000000000000000000000000000000000000000000000000000000000000000d // [3] length
    48656c6c6f2c20776f726c642100000000000000000000000000000000000000 // [3]
    ";

    serialize_and_compare_fnargs(&d, expected);
}

#[test]
fn dynamictypes_g() {
    // g(uint256[][],string[])
    #[derive(Serialize, Debug)]
    struct Data(Vec<Vec<U256>>, Vec<&'static str>);

    let d = Data(
        vec![vec![1.into(), 2.into()], vec![3.into()]],
        vec!["one", "two", "three"],
    );
    serialize_and_compare_fnargs(&d, DYNAMICTYPES_G);
}

#[test]
fn dynamictypes_g_decode() {
    let ty: AbiType = "tuple(uint256[][] numbers, string[] words)".parse().unwrap();
    let mut framed = vec![0u8; 31];
    framed.push(0x20);
    framed.extend_from_slice(&expected_bytes(DYNAMICTYPES_G));

    let value = decode(&framed, &ty).unwrap();
    let words = value.field(1).and_then(Value::as_items).unwrap();
    assert_eq!(words[2], Value::String("three".to_owned()));
    // Decoding and encoding again must yield the exact same bytes.
    assert_eq!(encode(&value).unwrap(), framed);
}

#[test]
fn dynstruct_in_dynarray() {
    /*
    struct Inner { bytes v; }
    struct Data { Inner[] a; bytes b; }
    */
    #[derive(Serialize, Debug)]
    struct Data {
        a: Vec<BytesContainer>,
        #[serde(with = "as_bytes")]
        b: [u8; 5],
    }

    let d = Data {
        a: vec![BytesContainer(gen(0xa0)), BytesContainer(gen(0xb0))],
        b: [0x11, 0x22, 0x33, 0x44, 0x55],
    };

    let expected = "
0000000000000000000000000000000000000000000000000000000000000020 // d offset
    0000000000000000000000000000000000000000000000000000000000000040 // d.a offset
    0000000000000000000000000000000000000000000000000000000000000160 // d.b offset
        0000000000000000000000000000000000000000000000000000000000000002 // d.a length
        0000000000000000000000000000000000000000000000000000000000000040 // d.a[0] offset
        00000000000000000000000000000000000000000000000000000000000000a0 // d.a[1] offset
            0000000000000000000000000000000000000000000000000000000000000020 // d.a[0].v offset
                0000000000000000000000000000000000000000000000000000000000000004 // d.a[0].v length
                a1a2a3a400000000000000000000000000000000000000000000000000000000 // d.a[0].v
            0000000000000000000000000000000000000000000000000000000000000020 // d.a[1].v offset
                0000000000000000000000000000000000000000000000000000000000000004 // d.a[1].v length
                b1b2b3b400000000000000000000000000000000000000000000000000000000 // d.a[1].v

        0000000000000000000000000000000000000000000000000000000000000005 // d.b length
        1122334455000000000000000000000000000000000000000000000000000000 // d.b
    ";
    serialize_and_compare(&d, expected);
}

#[test]
fn dynstruct_in_fixedarray() {
    #[derive(Serialize, Debug)]
    struct Data {
        a: [BytesContainer; 2],
        #[serde(with = "as_bytes")]
        b: [u8; 5],
    }

    let d = Data {
        a: [BytesContainer(gen(0xa0)), BytesContainer(gen(0xb0))],
        b: [0x11, 0x22, 0x33, 0x44, 0x55],
    };

    let expected = "
0000000000000000000000000000000000000000000000000000000000000020 // d offset
    0000000000000000000000000000000000000000000000000000000000000040 // d.a offset
    0000000000000000000000000000000000000000000000000000000000000140 // d.b offset
        0000000000000000000000000000000000000000000000000000000000000040 // d.a[0] offset
        00000000000000000000000000000000000000000000000000000000000000a0 // d.a[1] offset
            0000000000000000000000000000000000000000000000000000000000000020 // d.a[0].v offset
                0000000000000000000000000000000000000000000000000000000000000004 // d.a[0].v length
                a1a2a3a400000000000000000000000000000000000000000000000000000000 // d.a[0].v

            0000000000000000000000000000000000000000000000000000000000000020 // d.a[1].v offset
                0000000000000000000000000000000000000000000000000000000000000004 // d.a[1].v length
                b1b2b3b400000000000000000000000000000000000000000000000000000000 // d.a[1].v

        0000000000000000000000000000000000000000000000000000000000000005 // d.b length
        1122334455000000000000000000000000000000000000000000000000000000 // d.b
    ";
    serialize_and_compare(&d, expected);
}

#[test]
fn unrepresentable_types() {
    #[derive(Serialize)]
    enum Choice {
        A,
    }

    assert_eq!(to_value(&1.5f64), Err(Error::TypeNotRepresentable("f64")));
    assert_eq!(to_value(&Choice::A), Err(Error::TypeNotRepresentable("enum")));
    assert_eq!(to_value(&Some(1u8)), Err(Error::TypeNotRepresentable("Option")));
    assert_eq!(to_value(&'x'), Err(Error::TypeNotYetSupported("char")));
    assert_eq!(
        encode(&Value::FixedBytes(vec![0; 33])),
        Err(Error::FixedBytesTooLong(33))
    );
}

#[test]
fn decode_rejects_malformed() {
    let ty: AbiType = "tuple(address a, bool b)".parse().unwrap();
    let mut data = vec![0u8; 64];
    assert!(decode(&data[..40], &ty).is_err());

    data[0] = 1; // dirty address padding
    assert!(decode(&data, &ty).is_err());

    data[0] = 0;
    data[63] = 2; // bool out of range
    assert!(decode(&data, &ty).is_err());

    let bytes: AbiType = "bytes".parse().unwrap();
    let mut huge = vec![0u8; 64];
    huge[31] = 0x20;
    huge[63] = 0xff; // length past the end of the input
    assert_eq!(decode(&huge, &bytes), Err(Error::UnexpectedEnd));
}

#[test]
fn hash_is_keccak_of_encoding() {
    #[derive(Serialize)]
    struct Data {
        a: Address,
        b: U256,
    }
    let d = Data {
        a: etherscan_address(),
        b: 7.into(),
    };
    let encoded = encode(&to_value(&d).unwrap()).unwrap();
    assert_eq!(to_hash(&d).unwrap(), keccak256(&encoded));
    assert_eq!(to_hash(&d).unwrap(), to_hash(&to_value(&d).unwrap()).unwrap());
}
