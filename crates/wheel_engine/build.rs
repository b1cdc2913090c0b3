// build.rs
// Compiles the GLSL pipeline shaders to SPIR-V with glslc from the Vulkan SDK.
// Output goes to <workspace>/target/shaders/<name>.<stage>.spv.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const STAGES: [&str; 2] = ["vert", "frag"];

fn is_stale(source: &Path, output: &Path) -> bool {
    let modified = |path: &Path| std::fs::metadata(path).and_then(|meta| meta.modified()).ok();
    match (modified(source), modified(output)) {
        (Some(src), Some(dst)) => src > dst,
        _ => true,
    }
}

fn compile(glslc: &str, source: &Path, output: &Path) {
    let status = Command::new(glslc).arg(source).arg("-o").arg(output).status();
    match status {
        Ok(s) if s.success() => eprintln!("info: Compiled {:?} -> {:?}", source, output),
        Ok(s) => panic!("glslc failed for {:?} with exit code {}", source, s.code().unwrap_or(-1)),
        Err(e) => panic!("Failed to run glslc for {:?}: {}", source, e),
    }
}

fn main() {
    println!("cargo:rerun-if-changed=../../resources/shaders");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");

    if env::var("SKIP_SHADERS").is_ok() {
        eprintln!("info: Skipping shader compilation (SKIP_SHADERS set)");
        return;
    }

    let Ok(vulkan_sdk) = env::var("VULKAN_SDK") else {
        println!("cargo:warning=VULKAN_SDK not set, shader compilation skipped");
        return;
    };

    let glslc = if cfg!(target_os = "windows") {
        format!("{}\\Bin\\glslc.exe", vulkan_sdk)
    } else {
        format!("{}/bin/glslc", vulkan_sdk)
    };
    if !Path::new(&glslc).exists() {
        panic!("glslc not found at {}; check the Vulkan SDK install", glslc);
    }

    let shader_dir = PathBuf::from("../../resources/shaders");
    let target_dir = PathBuf::from("../../target/shaders");
    if let Err(e) = std::fs::create_dir_all(&target_dir) {
        println!("cargo:warning=Failed to create {:?}: {}", target_dir, e);
        return;
    }

    let entries = match std::fs::read_dir(&shader_dir) {
        Ok(entries) => entries,
        Err(_) => {
            println!("cargo:warning=No shader directory at {:?}", shader_dir);
            return;
        }
    };

    let mut compiled = 0;
    for path in entries.filter_map(Result::ok).map(|entry| entry.path()) {
        let is_stage = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| STAGES.contains(&ext));
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !is_stage {
            continue;
        }

        // triangle.vert -> triangle.vert.spv, so stages of one shader never collide
        let output = target_dir.join(format!("{}.spv", file_name));
        if is_stale(&path, &output) {
            compile(&glslc, &path, &output);
            compiled += 1;
        }
    }

    eprintln!("info: {} shader(s) compiled", compiled);
}
