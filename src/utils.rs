pub mod hex_ext;
