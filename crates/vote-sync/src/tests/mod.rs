mod sync_flow_test;
