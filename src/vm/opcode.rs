//! 字节码操作码定义
//!
//! 单元（cell）编码：每条指令占一个操作码单元，带操作数的指令紧跟一个操作数单元。
//!
//! 指令编码空间规划：
//! - 0x00-0x0F：控制与寄存器装载
//! - 0x10-0x1F：栈与堆
//! - 0x20-0x2F：算术与比较
//! - 0x30-0x3F：跳转与调用
//! - 0x40-0x4F：宿主交互（原生调用、休眠、检查点）

use std::fmt;

/// 字节码操作码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// 空操作
    Nop = 0x00,

    /// 停机
    /// 操作数：退出码（0 = 正常返回 PRI）
    Halt = 0x01,

    /// PRI = 常量
    ConstPri = 0x02,

    /// ALT = 常量
    ConstAlt = 0x03,

    /// PRI = [地址]
    LoadPri = 0x04,

    /// ALT = [地址]
    LoadAlt = 0x05,

    /// [地址] = PRI
    StorPri = 0x06,

    /// PRI = [FRM + 偏移]
    LoadSPri = 0x07,

    /// [FRM + 偏移] = PRI
    StorSPri = 0x08,

    PushPri = 0x10,
    PushAlt = 0x11,
    /// 操作数：常量
    PushC = 0x12,
    PopPri = 0x13,
    PopAlt = 0x14,

    /// STK += 操作数；ALT = STK
    Stack = 0x15,

    /// ALT = HEA；HEA += 操作数
    Heap = 0x16,

    /// PRI = PRI + ALT
    Add = 0x20,
    /// PRI = PRI - ALT
    Sub = 0x21,
    /// PRI = PRI * ALT
    Smul = 0x22,
    /// PRI = PRI / ALT，ALT = PRI % ALT
    Sdiv = 0x23,
    /// PRI = PRI == ALT
    Eq = 0x24,
    /// PRI = PRI < ALT
    Less = 0x25,
    /// PRI += 1
    IncPri = 0x26,
    /// 0 <= PRI <= 操作数，否则越界
    Bounds = 0x27,

    /// 无条件跳转（绝对地址）
    Jump = 0x30,
    /// PRI == 0 时跳转
    Jzer = 0x31,
    /// PRI != 0 时跳转
    Jnz = 0x32,
    /// 压入返回地址并跳转
    Call = 0x33,
    /// 函数序言：压入 FRM，FRM = STK
    Proc = 0x34,
    /// 弹出 FRM 与返回地址
    Ret = 0x35,

    /// 原生函数调用
    /// 操作数：原生函数表索引
    Sysreq = 0x40,
    /// 以 PRI 为延迟提示挂起，可恢复
    Sleep = 0x41,
    /// 监视检查点
    Break = 0x42,
}

impl Opcode {
    /// 操作码名称（反汇编用）
    pub fn name(&self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::Halt => "halt",
            Opcode::ConstPri => "const.pri",
            Opcode::ConstAlt => "const.alt",
            Opcode::LoadPri => "load.pri",
            Opcode::LoadAlt => "load.alt",
            Opcode::StorPri => "stor.pri",
            Opcode::LoadSPri => "load.s.pri",
            Opcode::StorSPri => "stor.s.pri",
            Opcode::PushPri => "push.pri",
            Opcode::PushAlt => "push.alt",
            Opcode::PushC => "push.c",
            Opcode::PopPri => "pop.pri",
            Opcode::PopAlt => "pop.alt",
            Opcode::Stack => "stack",
            Opcode::Heap => "heap",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Smul => "smul",
            Opcode::Sdiv => "sdiv",
            Opcode::Eq => "eq",
            Opcode::Less => "less",
            Opcode::IncPri => "inc.pri",
            Opcode::Bounds => "bounds",
            Opcode::Jump => "jump",
            Opcode::Jzer => "jzer",
            Opcode::Jnz => "jnz",
            Opcode::Call => "call",
            Opcode::Proc => "proc",
            Opcode::Ret => "ret",
            Opcode::Sysreq => "sysreq",
            Opcode::Sleep => "sleep",
            Opcode::Break => "break",
        }
    }

    /// 获取指令的操作数数量
    pub fn operand_count(&self) -> usize {
        match self {
            Opcode::Halt
            | Opcode::ConstPri
            | Opcode::ConstAlt
            | Opcode::LoadPri
            | Opcode::LoadAlt
            | Opcode::StorPri
            | Opcode::LoadSPri
            | Opcode::StorSPri
            | Opcode::PushC
            | Opcode::Stack
            | Opcode::Heap
            | Opcode::Bounds
            | Opcode::Jump
            | Opcode::Jzer
            | Opcode::Jnz
            | Opcode::Call
            | Opcode::Sysreq => 1,
            _ => 0,
        }
    }

    /// 检查是否是跳转指令（操作数为代码地址）
    pub fn is_jump_op(&self) -> bool {
        matches!(
            self,
            Opcode::Jump | Opcode::Jzer | Opcode::Jnz | Opcode::Call
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl TryFrom<i32> for Opcode {
    type Error = ();

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Opcode::Nop),
            0x01 => Ok(Opcode::Halt),
            0x02 => Ok(Opcode::ConstPri),
            0x03 => Ok(Opcode::ConstAlt),
            0x04 => Ok(Opcode::LoadPri),
            0x05 => Ok(Opcode::LoadAlt),
            0x06 => Ok(Opcode::StorPri),
            0x07 => Ok(Opcode::LoadSPri),
            0x08 => Ok(Opcode::StorSPri),
            0x10 => Ok(Opcode::PushPri),
            0x11 => Ok(Opcode::PushAlt),
            0x12 => Ok(Opcode::PushC),
            0x13 => Ok(Opcode::PopPri),
            0x14 => Ok(Opcode::PopAlt),
            0x15 => Ok(Opcode::Stack),
            0x16 => Ok(Opcode::Heap),
            0x20 => Ok(Opcode::Add),
            0x21 => Ok(Opcode::Sub),
            0x22 => Ok(Opcode::Smul),
            0x23 => Ok(Opcode::Sdiv),
            0x24 => Ok(Opcode::Eq),
            0x25 => Ok(Opcode::Less),
            0x26 => Ok(Opcode::IncPri),
            0x27 => Ok(Opcode::Bounds),
            0x30 => Ok(Opcode::Jump),
            0x31 => Ok(Opcode::Jzer),
            0x32 => Ok(Opcode::Jnz),
            0x33 => Ok(Opcode::Call),
            0x34 => Ok(Opcode::Proc),
            0x35 => Ok(Opcode::Ret),
            0x40 => Ok(Opcode::Sysreq),
            0x41 => Ok(Opcode::Sleep),
            0x42 => Ok(Opcode::Break),
            _ => Err(()),
        }
    }
}
