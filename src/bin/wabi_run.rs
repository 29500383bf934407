use clap::Parser;
use std::fs;
use std::path::PathBuf;
use wabi::{Module, Value, VirtualMachine};

#[derive(Parser, Debug)]
#[command(name = "wabi-run")]
#[command(about = "Execute WebAssembly modules with the wabi interpreter")]
#[command(long_about = "
wabi-run - WebAssembly Bytecode Interpreter Runner

Runs a WebAssembly module from the command line. By default the exported
main function is executed in the C convention: the module file name and any
trailing arguments are copied into linear memory as argc/argv, and the
returned i32 becomes the process exit code.

Examples:
  # Run main with no extra arguments
  wabi-run module.wasm

  # Run main with program arguments
  wabi-run module.wasm --args input.txt verbose

  # Invoke a specific exported function (typed arguments)
  wabi-run module.wasm --invoke add --args 10:i32 20:i32

  # Bound the interpreter
  wabi-run module.wasm --fuel 1000000 --call-depth 200
")]
struct Args {
    /// Path to the WebAssembly module file
    wasm_file: PathBuf,

    /// Function to invoke instead of running main
    #[arg(short, long)]
    invoke: Option<String>,

    /// Arguments: plain strings for main, value:type pairs for --invoke
    #[arg(short, long, value_delimiter = ' ', num_args = 0..)]
    args: Vec<String>,

    /// Instruction budget; execution traps when it runs out
    #[arg(long)]
    fuel: Option<u64>,

    /// Maximum call stack depth
    #[arg(long)]
    call_depth: Option<usize>,

    /// List all exports instead of running
    #[arg(short, long)]
    list_exports: bool,
}

fn parse_value(arg: &str) -> Result<Value, String> {
    let Some((value_str, type_str)) = arg.rsplit_once(':') else {
        return Err(format!(
            "Invalid argument format '{}'. Expected value:type (e.g. 42:i32)",
            arg
        ));
    };

    match type_str {
        "i32" => value_str
            .parse::<i32>()
            .map(Value::I32)
            .map_err(|_| format!("Failed to parse '{}' as i32", value_str)),
        "i64" => value_str
            .parse::<i64>()
            .map(Value::I64)
            .map_err(|_| format!("Failed to parse '{}' as i64", value_str)),
        "f32" => value_str
            .parse::<f32>()
            .map(Value::F32)
            .map_err(|_| format!("Failed to parse '{}' as f32", value_str)),
        "f64" => value_str
            .parse::<f64>()
            .map(Value::F64)
            .map_err(|_| format!("Failed to parse '{}' as f64", value_str)),
        _ => Err(format!(
            "Unknown type '{}'. Supported types: i32, i64, f32, f64",
            type_str
        )),
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

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let bytes =
        fs::read(&args.wasm_file).map_err(|e| format!("Failed to read WASM file: {}", e))?;
    let module =
        Module::from_bytes(&bytes).map_err(|e| format!("Failed to decode module: {}", e))?;

    if args.list_exports {
        println!("Exported functions:");
        for export in &module.exports {
            if export.kind == wabi::types::ExternKind::Func {
                println!(
                    "  {} {}",
                    export.name,
                    signature_string(&module, export.index)
                );
            }
        }
        return Ok(());
    }

    let mut vm = VirtualMachine::new(module);
    if let Some(fuel) = args.fuel {
        vm.state.fuel = Some(fuel);
    }
    if let Some(depth) = args.call_depth {
        vm.state.call_depth_limit = depth;
    }

    match args.invoke {
        Some(name) => {
            let mut values = Vec::new();
            for arg in &args.args {
                values.push(parse_value(arg)?);
            }
            let result = vm
                .invoke(&name, &values)
                .map_err(|e| format!("Execution failed: {}", e))?;
            match result {
                Some(value) => println!("Result: {}", value),
                None => println!("Function completed (no return value)"),
            }
            Ok(())
        }
        None => {
            let mut argv = vec![args.wasm_file.display().to_string()];
            argv.extend(args.args.iter().cloned());
            let code = vm
                .execute(&argv)
                .map_err(|e| format!("Execution failed: {}", e))?;
            std::process::exit(code);
        }
    }
}
