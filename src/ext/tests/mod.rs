//! 扩展测试
