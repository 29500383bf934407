use clap::Parser;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use wabi::types::ExternKind;
use wabi::Module;

#[derive(Parser, Debug)]
#[command(name = "wabi-inspect")]
#[command(about = "Inspect the structure of a WebAssembly module")]
#[command(long_about = "
wabi-inspect - WebAssembly Module Inspector

Decodes a module and prints its types, imports, functions, memories,
globals, tables, exports and data segments.

Examples:
  # Human-readable summary
  wabi-inspect module.wasm

  # Machine-readable summary
  wabi-inspect module.wasm --json

  # Show only exports
  wabi-inspect module.wasm --exports-only
")]
struct Args {
    /// Path to the WebAssembly module file
    wasm_file: PathBuf,

    /// Emit the summary as JSON
    #[arg(long)]
    json: bool,

    /// Show only exports
    #[arg(long)]
    exports_only: bool,
}

#[derive(Serialize)]
struct FunctionSummary {
    index: u32,
    name: Option<String>,
    signature: String,
    imported: bool,
    locals: usize,
    body_len: usize,
}

#[derive(Serialize)]
struct ExportSummary {
    name: String,
    kind: &'static str,
    index: u32,
}

#[derive(Serialize)]
struct ModuleSummary {
    file: String,
    size: usize,
    types: Vec<String>,
    functions: Vec<FunctionSummary>,
    memories: Vec<(u32, u32)>,
    globals: Vec<String>,
    tables: Vec<(u32, u32)>,
    exports: Vec<ExportSummary>,
    start: Option<u32>,
    data_segments: usize,
}

fn kind_name(kind: ExternKind) -> &'static str {
    match kind {
        ExternKind::Func => "function",
        ExternKind::Table => "table",
        ExternKind::Mem => "memory",
        ExternKind::Global => "global",
    }
}

fn signature_string(module: &Module, func_idx: u32) -> String {
    match module.func_type(func_idx) {
        Ok(sig) => {
            let params = sig
                .params
                .iter()
                .map(|t| t.name())
                .collect::<Vec<_>>()
                .join(", ");
            match sig.result {
                Some(r) => format!("({}) -> {}", params, r.name()),
                None => format!("({})", params),
            }
        }
        Err(_) => "(?)".to_string(),
    }
}

fn summarize(module: &Module, file: &PathBuf, size: usize) -> ModuleSummary {
    let n_imports = module.n_imported_funcs();
    let mut functions = Vec::new();
    for (i, import) in module.imports.iter().enumerate() {
        functions.push(FunctionSummary {
            index: i as u32,
            name: Some(format!("{}.{}", import.module, import.field)),
            signature: signature_string(module, i as u32),
            imported: true,
            locals: 0,
            body_len: 0,
        });
    }
    for (i, code) in module.code.iter().enumerate() {
        let index = (n_imports + i) as u32;
        functions.push(FunctionSummary {
            index,
            name: module.function_name(index).map(str::to_string),
            signature: signature_string(module, index),
            imported: false,
            locals: code.locals.len(),
            body_len: code.body.len(),
        });
    }

    ModuleSummary {
        file: file.display().to_string(),
        size,
        types: module
            .types
            .iter()
            .map(|t| {
                let params = t.params.iter().map(|v| v.name()).collect::<Vec<_>>().join(", ");
                match t.result {
                    Some(r) => format!("({}) -> {}", params, r.name()),
                    None => format!("({})", params),
                }
            })
            .collect(),
        functions,
        memories: module.memories.clone(),
        globals: module
            .globals
            .iter()
            .map(|g| {
                format!(
                    "{} {} = {}",
                    if g.mutable { "mut" } else { "const" },
                    g.ty.name(),
                    g.value
                )
            })
            .collect(),
        tables: module.tables.iter().map(|t| (t.min, t.max)).collect(),
        exports: module
            .exports
            .iter()
            .map(|e| ExportSummary {
                name: e.name.clone(),
                kind: kind_name(e.kind),
                index: e.index,
            })
            .collect(),
        start: module.start,
        data_segments: module.data.len(),
    }
}

fn print_text(summary: &ModuleSummary) {
    println!("Module: {}", summary.file);
    println!("Size: {} bytes", summary.size);
    println!();

    if summary.types.is_empty() {
        println!("Types: none");
    } else {
        println!("Types:");
        for (i, t) in summary.types.iter().enumerate() {
            println!("  [{}] {}", i, t);
        }
    }
    println!();

    if summary.functions.is_empty() {
        println!("Functions: none");
    } else {
        println!("Functions:");
        for f in &summary.functions {
            let name = f.name.as_deref().unwrap_or("<unnamed>");
            if f.imported {
                println!("  [{}] {} {} (imported)", f.index, name, f.signature);
            } else {
                println!(
                    "  [{}] {} {} ({} locals, {} instructions)",
                    f.index, name, f.signature, f.locals, f.body_len
                );
            }
        }
    }
    println!();

    for (i, (min, max)) in summary.memories.iter().enumerate() {
        println!("Memory [{}]: {}..{} pages", i, min, max);
    }
    for (i, g) in summary.globals.iter().enumerate() {
        println!("Global [{}]: {}", i, g);
    }
    for (i, (min, max)) in summary.tables.iter().enumerate() {
        println!("Table [{}]: {}..{} entries", i, min, max);
    }
    if let Some(idx) = summary.start {
        println!("Start function: {}", idx);
    }
    if summary.data_segments > 0 {
        println!("Data segments: {}", summary.data_segments);
    }
    println!();

    print_exports(summary);
}

fn print_exports(summary: &ModuleSummary) {
    if summary.exports.is_empty() {
        println!("Exports: none");
        return;
    }
    println!("Exports:");
    for e in &summary.exports {
        println!("  {} ({} {})", e.name, e.kind, e.index);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let bytes =
        fs::read(&args.wasm_file).map_err(|e| format!("Failed to read WASM file: {}", e))?;
    let module =
        Module::from_bytes(&bytes).map_err(|e| format!("Failed to decode module: {}", e))?;

    let summary = summarize(&module, &args.wasm_file, bytes.len());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if args.exports_only {
        print_exports(&summary);
    } else {
        print_text(&summary);
    }
    Ok(())
}
