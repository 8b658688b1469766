//! 程序镜像
//!
//! 定义 .cvm 程序镜像格式并实现序列化。
//! 魔数大端序（方便调试），其他数据小端序。

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::vm::debug::{DebugInfo, LineEntry};
use crate::vm::errors::VmError;

/// 单元类型
pub type Cell = i32;

/// 单元字节数
pub const CELL_SIZE: usize = std::mem::size_of::<Cell>();

/// 镜像魔数 'C' 'V' 'M' 'X'
const MAGIC: u32 = 0x43564D58;
/// 版本号
pub const VERSION: u16 = 1;

/// 默认文件扩展名（加载失败时追加重试）
pub const DEFAULT_EXTENSION: &str = "cvm";

/// 镜像包含调试信息段
pub const FLAG_DEBUG: u16 = 0x0001;
/// 程序不含检查点（BREAK），监视钩子不会被调用
pub const FLAG_NOCHECKS: u16 = 0x0002;

const NO_ENTRY: i32 = -1;

/// 镜像加载错误
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("bad magic 0x{0:08X}")]
    BadMagic(u32),

    #[error("unsupported image version {0}")]
    Version(u16),

    #[error("invalid image: {0}")]
    Invalid(String),

    #[error("image carries no debug information")]
    NoDebugInfo,
}

impl LoadError {
    /// Engine error code equivalent
    pub fn vm_error(&self) -> VmError {
        match self {
            LoadError::Version(_) => VmError::Version,
            LoadError::NoDebugInfo => VmError::Debug,
            _ => VmError::Format,
        }
    }
}

/// 公共函数入口
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicEntry {
    pub name: String,
    /// Code address (bytes)
    pub address: usize,
}

/// 已加载的程序
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub flags: u16,
    /// Code address of `main`, if the program has one
    pub main: Option<usize>,
    pub code: Vec<Cell>,
    /// 初始化数据
    pub data: Vec<Cell>,
    pub publics: Vec<PublicEntry>,
    /// 原生函数导入名，按 SYSREQ 索引排列
    pub natives: Vec<String>,
    /// Only populated when explicitly requested (or by the builder).
    pub debug: Option<DebugInfo>,
}

impl Program {
    /// Code size in bytes
    pub fn code_size(&self) -> usize {
        self.code.len() * CELL_SIZE
    }

    /// Initialized data size in bytes
    pub fn data_size(&self) -> usize {
        self.data.len() * CELL_SIZE
    }

    pub fn has_checks(&self) -> bool {
        self.flags & FLAG_NOCHECKS == 0
    }

    pub fn has_debug_info(&self) -> bool {
        self.flags & FLAG_DEBUG != 0
    }

    /// Index of a public function by name
    pub fn find_public(
        &self,
        name: &str,
    ) -> Option<usize> {
        self.publics.iter().position(|p| p.name == name)
    }

    /// Load an image from disk, skipping the debug section.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        debug!("loading program image {}", path.display());
        let file = File::open(path)?;
        Self::read_from(&mut BufReader::new(file), false)
    }

    /// Write the image to disk
    pub fn save(
        &self,
        path: &Path,
    ) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()
    }

    /// 序列化到 Writer
    pub fn write_to<W: Write>(
        &self,
        writer: &mut W,
    ) -> io::Result<()> {
        let mut flags = self.flags & !FLAG_DEBUG;
        if self.debug.is_some() {
            flags |= FLAG_DEBUG;
        }

        writer.write_all(&MAGIC.to_be_bytes())?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&flags.to_le_bytes())?;
        let main = self.main.map(|m| m as i32).unwrap_or(NO_ENTRY);
        writer.write_all(&main.to_le_bytes())?;

        write_cells(writer, &self.code)?;
        write_cells(writer, &self.data)?;

        writer.write_all(&(self.publics.len() as u32).to_le_bytes())?;
        for public in &self.publics {
            write_str(writer, &public.name)?;
            writer.write_all(&(public.address as u32).to_le_bytes())?;
        }

        writer.write_all(&(self.natives.len() as u32).to_le_bytes())?;
        for native in &self.natives {
            write_str(writer, native)?;
        }

        if let Some(dbg) = &self.debug {
            writer.write_all(&(dbg.files().len() as u32).to_le_bytes())?;
            for file in dbg.files() {
                write_str(writer, file)?;
            }
            writer.write_all(&(dbg.lines().len() as u32).to_le_bytes())?;
            for entry in dbg.lines() {
                writer.write_all(&(entry.address as u32).to_le_bytes())?;
                writer.write_all(&(entry.file as u16).to_le_bytes())?;
                writer.write_all(&entry.line.to_le_bytes())?;
            }
        }
        Ok(())
    }

    /// 从 Reader 反序列化
    pub fn read_from<R: Read>(
        reader: &mut R,
        with_debug: bool,
    ) -> Result<Self, LoadError> {
        let mut r = ImageReader { inner: reader };

        let mut magic = [0u8; 4];
        r.inner.read_exact(&mut magic)?;
        let magic = u32::from_be_bytes(magic);
        if magic != MAGIC {
            return Err(LoadError::BadMagic(magic));
        }
        let version = r.u16()?;
        if version > VERSION {
            return Err(LoadError::Version(version));
        }
        let flags = r.u16()?;
        let main = match r.i32()? {
            NO_ENTRY => None,
            addr if addr >= 0 => Some(addr as usize),
            addr => return Err(LoadError::Invalid(format!("main entry {}", addr))),
        };

        let code = r.cells()?;
        let data = r.cells()?;

        let count = r.u32()?;
        let mut publics = Vec::new();
        for _ in 0..count {
            let name = r.string()?;
            let address = r.u32()? as usize;
            publics.push(PublicEntry { name, address });
        }

        let count = r.u32()?;
        let mut natives = Vec::new();
        for _ in 0..count {
            natives.push(r.string()?);
        }

        let code_size = code.len() * CELL_SIZE;
        let out_of_range = |addr: usize| addr >= code_size || addr % CELL_SIZE != 0;
        if main.is_some_and(out_of_range) {
            return Err(LoadError::Invalid("main entry outside code".to_string()));
        }
        if let Some(p) = publics.iter().find(|p| out_of_range(p.address)) {
            return Err(LoadError::Invalid(format!(
                "public '{}' outside code",
                p.name
            )));
        }

        let debug = if with_debug && flags & FLAG_DEBUG != 0 {
            let count = r.u32()?;
            let mut files = Vec::new();
            for _ in 0..count {
                files.push(r.string()?);
            }
            let count = r.u32()?;
            let mut lines = Vec::new();
            for _ in 0..count {
                let address = r.u32()? as usize;
                let file = r.u16()? as usize;
                let line = r.u32()?;
                lines.push(LineEntry {
                    address,
                    file,
                    line,
                });
            }
            Some(DebugInfo::from_parts(files, lines))
        } else {
            None
        };

        Ok(Self {
            flags,
            main,
            code,
            data,
            publics,
            natives,
            debug,
        })
    }
}

fn write_cells<W: Write>(
    writer: &mut W,
    cells: &[Cell],
) -> io::Result<()> {
    writer.write_all(&(cells.len() as u32).to_le_bytes())?;
    for cell in cells {
        writer.write_all(&cell.to_le_bytes())?;
    }
    Ok(())
}

fn write_str<W: Write>(
    writer: &mut W,
    s: &str,
) -> io::Result<()> {
    writer.write_all(&(s.len() as u16).to_le_bytes())?;
    writer.write_all(s.as_bytes())
}

struct ImageReader<'a, R: Read> {
    inner: &'a mut R,
}

impl<R: Read> ImageReader<'_, R> {
    fn u16(&mut self) -> io::Result<u16> {
        let mut buf = [0u8; 2];
        self.inner.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn u32(&mut self) -> io::Result<u32> {
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn i32(&mut self) -> io::Result<i32> {
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    /// Length-prefixed cell block. Counts come from the image, so nothing is
    /// allocated up front on their say-so.
    fn cells(&mut self) -> Result<Vec<Cell>, LoadError> {
        let len = u64::from(self.u32()?) * CELL_SIZE as u64;
        let mut bytes = Vec::new();
        self.inner.by_ref().take(len).read_to_end(&mut bytes)?;
        if bytes.len() as u64 != len {
            return Err(LoadError::Invalid(format!(
                "cell block of {} bytes cut short at {}",
                len,
                bytes.len()
            )));
        }
        Ok(bytes
            .chunks_exact(CELL_SIZE)
            .map(|c| Cell::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    fn string(&mut self) -> Result<String, LoadError> {
        let len = self.u16()? as usize;
        let mut bytes = vec![0u8; len];
        self.inner.read_exact(&mut bytes)?;
        String::from_utf8(bytes).map_err(|e| LoadError::Invalid(e.to_string()))
    }
}
