use std::rc::Rc;

use pretty_assertions::assert_eq;
use pyvm::{
    load_file, load_pyc, CodeBuilder, Constant, Interpreter, LoadError, LoaderConfig, NoPrint, Value, VmConfig,
};

/// A little marshal writer, enough for hand-assembled `.pyc` images.
#[derive(Default)]
struct Marshal(Vec<u8>);

impl Marshal {
    fn u32(&mut self, v: u32) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    fn short_str(&mut self, s: &str) -> &mut Self {
        self.0.push(b'z');
        self.0.push(u8::try_from(s.len()).unwrap());
        self.0.extend_from_slice(s.as_bytes());
        self
    }

    fn bytes(&mut self, b: &[u8]) -> &mut Self {
        self.0.push(b's');
        self.u32(u32::try_from(b.len()).unwrap());
        self.0.extend_from_slice(b);
        self
    }

    fn int(&mut self, v: i32) -> &mut Self {
        self.0.push(b'i');
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    fn none(&mut self) -> &mut Self {
        self.0.push(b'N');
        self
    }

    fn small_tuple(&mut self, len: u8) -> &mut Self {
        self.0.push(b')');
        self.0.push(len);
        self
    }

    fn names(&mut self, names: &[&str]) -> &mut Self {
        self.small_tuple(u8::try_from(names.len()).unwrap());
        for name in names {
            self.short_str(name);
        }
        self
    }

    /// Header fields of a code object, up to and including `co_code`.
    fn code_head(&mut self, argc: u32, nlocals: u32, flags: u32, bytecode: &[u8]) -> &mut Self {
        self.0.push(b'c');
        self.u32(argc).u32(0).u32(nlocals).u32(4).u32(flags);
        self.bytes(bytecode)
    }

    /// Trailing fields of a code object, from `co_filename` on.
    fn code_tail(&mut self, name: &str) -> &mut Self {
        self.short_str("prog.py").short_str(name).u32(1).bytes(&[])
    }
}

/// ```python
/// def double(x):
///     return x * 2
/// double(21)
/// ```
/// compiled as a module whose last expression is returned.
fn double_module() -> Vec<u8> {
    let mut m = Marshal::default();
    m.code_head(
        0,
        0,
        0x40,
        &[100, 0, 0, 100, 1, 0, 132, 0, 0, 90, 0, 0, 101, 0, 0, 100, 2, 0, 131, 1, 0, 83],
    );
    m.small_tuple(3);
    {
        m.code_head(1, 1, 0x43, &[124, 0, 0, 100, 1, 0, 20, 83]);
        m.small_tuple(2).none().int(2);
        m.names(&[]).names(&["x"]).names(&[]).names(&[]);
        m.code_tail("double");
    }
    m.short_str("double").int(21);
    m.names(&["double"]).names(&[]).names(&[]).names(&[]);
    m.code_tail("<module>");
    m.0
}

fn pyc(magic: u16, body: &[u8]) -> Vec<u8> {
    let mut out = magic.to_le_bytes().to_vec();
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&[0; 8]);
    out.extend_from_slice(body);
    out
}

fn execute(code: Rc<pyvm::Code>) -> Value {
    Interpreter::new(VmConfig::new(), NoPrint).exec_code(code, None).unwrap()
}

#[test]
fn runs_a_compiled_module() {
    let program = load_pyc(&pyc(3351, &double_module()), &LoaderConfig::new()).unwrap();
    assert_eq!(program.code.name, "<module>");
    assert_eq!(program.code.filename, "prog.py");
    let Constant::Code(inner) = &program.code.consts[0] else {
        panic!("first constant should be the function body");
    };
    assert_eq!(inner.varnames, vec!["x".to_owned()]);
    assert_eq!(execute(program.code), Value::Int(42));
}

#[test]
fn corrupt_images_fail_before_execution() {
    let config = LoaderConfig::new();
    let mut body = double_module();
    body.truncate(body.len() - 3);
    assert!(matches!(
        load_pyc(&pyc(3351, &body), &config),
        Err(LoadError::UnexpectedEof { .. })
    ));

    let mut bad_type = pyc(3351, &double_module());
    bad_type[12] = b'?';
    assert!(matches!(
        load_pyc(&bad_type, &config),
        Err(LoadError::UnknownType { code: b'?', offset: 0 })
    ));

    assert!(matches!(
        load_pyc(&pyc(62211, &double_module()), &config),
        Err(LoadError::BadMagic { magic: 62211, .. })
    ));
}

#[test]
fn deeply_nested_constants_are_rejected() {
    let mut m = Marshal::default();
    for _ in 0..200_000 {
        m.small_tuple(1);
    }
    m.none();
    let image = pyc(3351, &m.0);
    let outcome = std::thread::Builder::new()
        .stack_size(64 << 20)
        .spawn(move || load_pyc(&image, &LoaderConfig::new()).map(|_| ()))
        .unwrap()
        .join()
        .unwrap();
    let err = outcome.unwrap_err();
    assert!(matches!(err, LoadError::TooDeep { offset: 4000 }), "{err}");
    assert_eq!(err.to_string(), "marshal data nested too deeply at offset 4000");
}

#[test]
fn unknown_opcodes_are_rejected_at_load_time() {
    let mut m = Marshal::default();
    m.code_head(0, 0, 0x40, &[100, 0, 0, 0xfe, 83]);
    m.small_tuple(1).none();
    m.names(&[]).names(&[]).names(&[]).names(&[]);
    m.code_tail("<module>");
    let err = load_pyc(&pyc(3351, &m.0), &LoaderConfig::new()).unwrap_err();
    assert!(matches!(err, LoadError::Bytecode { .. }), "{err}");
}

#[test]
fn load_file_accepts_pyc_and_snapshots() {
    let dir = std::env::temp_dir().join(format!("pyvm-loader-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();

    let pyc_path = dir.join("double.pyc");
    std::fs::write(&pyc_path, pyc(3350, &double_module())).unwrap();
    let code = load_file(&pyc_path, &LoaderConfig::new()).unwrap();
    assert_eq!(execute(code), Value::Int(42));

    let mut b = CodeBuilder::new("<module>");
    b.load_const("snapshot").return_value();
    let snapshot_path = dir.join("module.bin");
    std::fs::write(&snapshot_path, b.build().unwrap().dump().unwrap()).unwrap();
    let code = load_file(&snapshot_path, &LoaderConfig::new()).unwrap();
    assert_eq!(execute(code), Value::from("snapshot"));

    let missing = load_file(dir.join("missing.pyc"), &LoaderConfig::new()).unwrap_err();
    assert!(matches!(missing, LoadError::Io(_)));

    std::fs::remove_dir_all(&dir).unwrap();
}
