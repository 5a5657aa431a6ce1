use std::env;
use std::fs::File;
use std::io::Write;
use std::path::Path;

//HAZQUEUE_SCAN_FACTOR

fn main() {
    println!("cargo:rerun-if-env-changed=HAZQUEUE_SCAN_FACTOR");

    let out_dir = env::var("OUT_DIR").expect("no out directory");
    let dest = Path::new(&out_dir).join("build_constants.rs");

    let mut file = File::create(&dest).expect("could not create file");

    // percentage of the active hazard record count, 125 equals a factor of 5/4
    let factor: u32 = env::var("HAZQUEUE_SCAN_FACTOR")
        .ok()
        .map_or(Ok(125), |var| var.parse())
        .expect("failed to parse env variable HAZQUEUE_SCAN_FACTOR");

    if factor == 0 {
        panic!("invalid HAZQUEUE_SCAN_FACTOR value (0)");
    }

    write!(&mut file, "const BUILD_SCAN_FACTOR: u32 = {};", factor)
        .expect("could not write to file");
}
