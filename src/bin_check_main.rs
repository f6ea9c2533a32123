use barser::{CreateFlags, Dictionary};
fn main() {
    let src = b"a {\nb {\nc 1;\n";
    match Dictionary::parse(src, CreateFlags::empty()) {
        Ok(_) => println!("unexpected ok"),
        Err((_, e)) => println!("kind={:?} line={} col={}", e.kind, e.line, e.column),
    }
}
