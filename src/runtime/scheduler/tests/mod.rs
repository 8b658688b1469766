//! Scheduler 单元测试
