use std::env;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Link as a boot service driver so the image stays resident after its entry point returns.
    if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("uefi") {
        println!("cargo:rustc-link-arg-bins=/subsystem:efi_boot_service_driver");
    }
}
