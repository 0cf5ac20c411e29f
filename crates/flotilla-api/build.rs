use std::env;

fn main() {
    env::set_var("PROTOC", protobuf_src::protoc());

    tonic_build::configure().build_client(false)
                            .emit_rerun_if_changed(false)
                            .compile(&["proto/controller.proto"], &["proto"])
                            .unwrap();
    println!("cargo:rerun-if-changed=proto/controller.proto");
}
