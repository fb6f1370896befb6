// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Strata WebAssembly Bindings
//!
//! WebGL2 backend for the batching core plus a JavaScript API built with
//! wasm-bindgen.

use wasm_bindgen::prelude::*;

mod api;
mod utils;
mod webgl;

pub use api::StrataViewer;
pub use utils::set_panic_hook as init_panic_hook;
pub use webgl::WebGl2Backend;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Get the version of Strata
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
