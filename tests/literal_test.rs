//! The restricted literal parser only needs to decode the closed grammar
//! `repr()` actually produces for command replies; these cover each shape
//! the command layer relies on.

use boardlink::commands::literal::{parse, parse_dict, Literal};

#[test]
fn parses_none_and_bools() {
    assert_eq!(parse("None").unwrap(), Literal::None);
    assert_eq!(parse("True").unwrap(), Literal::Bool(true));
    assert_eq!(parse("False").unwrap(), Literal::Bool(false));
}

#[test]
fn parses_negative_and_positive_ints() {
    assert_eq!(parse("42").unwrap(), Literal::Int(42));
    assert_eq!(parse("-17").unwrap(), Literal::Int(-17));
}

#[test]
fn parses_floats() {
    match parse("3.5").unwrap() {
        Literal::Float(f) => assert!((f - 3.5).abs() < 1e-9),
        other => panic!("expected float, got {other:?}"),
    }
}

#[test]
fn parses_escaped_bytes_literal() {
    let lit = parse(r"b'hi\x00\xff'").unwrap();
    assert_eq!(lit.as_bytes().unwrap(), &[b'h', b'i', 0x00, 0xff]);
}

#[test]
fn parses_text_string_with_escapes() {
    let lit = parse(r"'line one\nline two'").unwrap();
    assert_eq!(lit.as_str().unwrap(), "line one\nline two");
}

#[test]
fn parses_nested_list_of_tuples_like_ls_output() {
    let lit = parse("[('boot.py', 612), ('lib', -1)]").unwrap();
    let seq = lit.as_seq().unwrap();
    assert_eq!(seq.len(), 2);
    let first = seq[0].as_seq().unwrap();
    assert_eq!(first[0].as_str().unwrap(), "boot.py");
    assert_eq!(first[1].as_int().unwrap(), 612);
    let second = seq[1].as_seq().unwrap();
    assert_eq!(second[1].as_int().unwrap(), -1);
}

#[test]
fn parses_empty_list_for_empty_directory() {
    let lit = parse("[]").unwrap();
    assert_eq!(lit.as_seq().unwrap(), &[] as &[Literal]);
}

#[test]
fn parses_dict_for_fileinfo_reply() {
    let map = parse_dict("{'a.txt': (12, b'0123456789012345678901234567890123456789012345678901234567890123'), 'b.txt': None}").unwrap();
    assert_eq!(map.len(), 2);
    match &map["b.txt"] {
        Literal::None => {}
        other => panic!("expected None, got {other:?}"),
    }
    match &map["a.txt"] {
        Literal::Tuple(fields) => assert_eq!(fields[0].as_int(), Some(12)),
        other => panic!("expected tuple, got {other:?}"),
    }
}

#[test]
fn rejects_trailing_garbage() {
    assert!(parse("None garbage").is_err());
}

#[test]
fn rejects_unterminated_string() {
    assert!(parse("'unterminated").is_err());
}
