//! UniFFI binding generator binary
//!
//! Run with: cargo run --features uniffi --bin uniffi-bindgen generate --library <path> --language swift --out-dir <dir>

fn main() {
    uniffi::uniffi_bindgen_main()
}
